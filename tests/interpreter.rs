#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use rox::error::{DiagnosticCollector, Severity};
    use rox::lox::{is_expression, Lox, RunOutcome};
    use rox::value::Value;

    /// `print` sink the test can read back after the session consumed it.
    #[derive(Clone, Default)]
    struct SharedOutput(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Session {
        lox: Lox<DiagnosticCollector>,
        output: SharedOutput,
    }

    impl Session {
        fn new() -> Self {
            let output = SharedOutput::default();
            let lox = Lox::new(DiagnosticCollector::new()).with_output(Box::new(output.clone()));
            Session { lox, output }
        }

        fn run(&mut self, source: &str) -> RunOutcome {
            self.lox.run(source)
        }

        fn printed(&self) -> String {
            String::from_utf8(self.output.0.borrow().clone()).expect("utf-8 output")
        }

        fn errors(&self) -> Vec<String> {
            self.lox
                .reporter()
                .errors()
                .map(|d| d.message.clone())
                .collect()
        }
    }

    /// Run a program that must finish cleanly and return what it printed.
    fn output_of(source: &str) -> String {
        let mut session = Session::new();
        let outcome = session.run(source);
        assert_eq!(outcome, RunOutcome::Completed, "errors: {:?}", session.errors());
        session.printed()
    }

    /// Run a program that must fail at run time and return the message.
    fn runtime_error_of(source: &str) -> String {
        let mut session = Session::new();
        assert_eq!(session.run(source), RunOutcome::RuntimeError);

        let errors = session.errors();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        errors[0].clone()
    }

    #[test]
    fn test_arithmetic_and_printing() {
        assert_eq!(output_of("print 1 + 2 * 3;"), "7\n");
        assert_eq!(output_of("print (1 + 2) * 3 - 4 / 8;"), "8.5\n");
        assert_eq!(output_of("print \"foo\" + \"bar\";"), "foobar\n");
        assert_eq!(output_of("print -(3);"), "-3\n");
        assert_eq!(output_of("print !nil;"), "true\n");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(
            output_of(
                "fun f() {} class C {}
                 print f; print C; print C(); print clock;
                 print 3.0; print 2.5; print nil; print true; print \"s\";"
            ),
            "<fn f>\n<class C>\n<instance of C>\n<native fn clock>\n3\n2.5\nnil\ntrue\ns\n"
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(
            output_of(
                "fun f() {}
                 print 1 == 1; print \"a\" == \"a\"; print nil == false;
                 print f == f; print 1 == \"1\"; print nil == nil;"
            ),
            "true\ntrue\nfalse\ntrue\nfalse\ntrue\n"
        );
    }

    #[test]
    fn test_instances_compare_by_identity() {
        assert_eq!(
            output_of("class A {} var a = A(); var b = a; print a == b; print A() == A();"),
            "true\nfalse\n"
        );
    }

    #[test]
    fn test_shadowing_leaves_outer_binding() {
        let mut session = Session::new();
        let outcome = session.run("var a = 1; { var a = 2; } print a;");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(session.printed(), "1\n");
        assert_eq!(session.lox.interpreter().global("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_closure_distance_is_fixed_at_definition() {
        let source = "var a = 1;
                      {
                        fun getA() { return a; }
                        print getA();
                        var a = \"local\";
                        print getA();
                      }";

        assert_eq!(output_of(source), "1\n1\n");
    }

    #[test]
    fn test_closures_keep_their_own_state() {
        let source = "fun makeCounter() {
                        var i = 0;
                        fun count() { i = i + 1; return i; }
                        return count;
                      }
                      var a = makeCounter();
                      var b = makeCounter();
                      print a(); print a(); print b();";

        assert_eq!(output_of(source), "1\n2\n1\n");
    }

    #[test]
    fn test_recursion() {
        let source = "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
                      print fib(10);";

        assert_eq!(output_of(source), "55\n");
    }

    #[test]
    fn test_continue_still_runs_the_increment() {
        let source = "var a = 0;
                      for (var i = 0; i < 10; i = i + 1) { if (i == 5) continue; a = a + 1; }
                      print a;";

        assert_eq!(output_of(source), "9\n");
    }

    #[test]
    fn test_break_leaves_the_loop() {
        assert_eq!(
            output_of("var a = 0; while (true) { a = a + 1; break; } print a;"),
            "1\n"
        );
        assert_eq!(
            output_of("for (var i = 0; ; i = i + 1) { if (i == 3) break; print i; }"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn test_break_only_leaves_the_inner_loop() {
        let source = "var n = 0;
                      for (var i = 0; i < 3; i = i + 1) {
                        for (var j = 0; j < 3; j = j + 1) {
                          if (j == 1) break;
                          n = n + 1;
                        }
                      }
                      print n;";

        assert_eq!(output_of(source), "3\n");
    }

    #[test]
    fn test_continue_in_an_inner_while() {
        let source = "var n = 0;
                      var i = 0;
                      while (i < 3) {
                        i = i + 1;
                        var j = 0;
                        while (j < 3) {
                          j = j + 1;
                          if (j == 2) continue;
                          n = n + 1;
                        }
                      }
                      print n;";

        assert_eq!(output_of(source), "6\n");
    }

    #[test]
    fn test_return_from_inside_a_loop() {
        assert_eq!(
            output_of("fun f() { while (true) { for (;;) { return 7; } } } print f();"),
            "7\n"
        );
        assert_eq!(output_of("fun g() {} print g();"), "nil\n");
    }

    #[test]
    fn test_logical_operators_return_the_deciding_operand() {
        let mut session = Session::new();

        assert_eq!(
            session.lox.evaluate_expression("nil or \"yes\""),
            Some(Value::String("yes".to_owned()))
        );
        assert_eq!(session.lox.evaluate_expression("1 and 2"), Some(Value::Number(2.0)));
        // the right side is never evaluated
        assert_eq!(
            session.lox.evaluate_expression("false and missing"),
            Some(Value::Bool(false))
        );
        assert_eq!(session.lox.evaluate_expression("0 or 1"), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_division_by_zero_yields_no_result() {
        let mut session = Session::new();

        assert_eq!(session.lox.evaluate_expression("1 / 0"), None);
        assert_eq!(session.errors(), vec!["Division by zero."]);
    }

    #[test]
    fn test_type_mismatch_yields_no_result() {
        let mut session = Session::new();

        assert_eq!(session.lox.evaluate_expression("1 + \"2\""), None);
        assert_eq!(session.errors(), vec!["Operands must be two numbers or two strings."]);

        let diagnostic = &session.lox.reporter().diagnostics[0];
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.position.start, 2);
    }

    #[test]
    fn test_operand_errors_name_operator_and_kind() {
        assert_eq!(
            runtime_error_of("print -\"a\";"),
            "Operand must be a number but found string."
        );
        assert_eq!(
            runtime_error_of("print 1 < nil;"),
            "Operands of '<' must be numbers but found nil."
        );
        assert_eq!(
            runtime_error_of("print true * 2;"),
            "Operands of '*' must be numbers but found boolean."
        );
    }

    #[test]
    fn test_runtime_error_stops_execution() {
        let mut session = Session::new();
        let outcome = session.run("print 1; print nil + 1; print 2;");

        assert_eq!(outcome, RunOutcome::RuntimeError);
        assert_eq!(session.printed(), "1\n");
        assert_eq!(session.errors().len(), 1);
    }

    #[test]
    fn test_static_errors_prevent_execution() {
        let mut session = Session::new();

        assert_eq!(session.run("print 1; print ;"), RunOutcome::StaticError);
        assert_eq!(session.run("print 1; return 2;"), RunOutcome::StaticError);
        assert_eq!(session.printed(), "");
    }

    #[test]
    fn test_warnings_do_not_prevent_execution() {
        let mut session = Session::new();

        assert_eq!(session.run("var unused; print 1;"), RunOutcome::Completed);
        assert_eq!(session.printed(), "1\n");
        assert_eq!(session.lox.reporter().warnings().count(), 1);
    }

    #[test]
    fn test_undefined_variables() {
        assert_eq!(runtime_error_of("print nope;"), "Undefined variable 'nope'.");
        assert_eq!(runtime_error_of("nope = 1;"), "Undefined variable 'nope'.");
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            runtime_error_of("fun f(a) { return a; } f();"),
            "Expected 1 arguments but got 0."
        );
        assert_eq!(
            runtime_error_of("class A {} A(1);"),
            "Expected 0 arguments but got 1."
        );
        assert_eq!(
            runtime_error_of("\"not a function\"();"),
            "Can only call functions and classes."
        );
    }

    #[test]
    fn test_properties() {
        assert_eq!(
            output_of("class A {} var a = A(); a.x = 1; a.x = a.x + 1; print a.x;"),
            "2\n"
        );
        assert_eq!(
            runtime_error_of("class A {} print A().missing;"),
            "Undefined property 'missing'."
        );
        assert_eq!(
            runtime_error_of("var x = 1; print x.y;"),
            "Only instances have properties."
        );
        assert_eq!(runtime_error_of("var x = 1; x.y = 2;"), "Only instances have fields.");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let source = "class A { m() { return \"method\"; } }
                      var a = A();
                      print a.m();
                      a.m = \"field\";
                      print a.m;";

        assert_eq!(output_of(source), "method\nfield\n");
    }

    #[test]
    fn test_bound_methods_remember_their_instance() {
        let source = "class Person { init(name) { this.name = name; } greet() { return \"hi \" + this.name; } }
                      var greet = Person(\"ada\").greet;
                      print greet();";

        assert_eq!(output_of(source), "hi ada\n");
    }

    #[test]
    fn test_initializer_returns_the_instance() {
        let source = "class P { init(x) { this.x = x; return; } }
                      var p = P(3);
                      print p.x;
                      print p.init(4) == p;
                      print p.x;";

        assert_eq!(output_of(source), "3\ntrue\n4\n");
    }

    #[test]
    fn test_inherited_methods_and_init() {
        let source = "class A { init(v) { this.v = v; } value() { return this.v; } }
                      class B < A {}
                      print B(5).value();";

        assert_eq!(output_of(source), "5\n");
    }

    #[test]
    fn test_super_binds_the_original_instance() {
        let source = "class A { name() { return \"A:\" + this.tag; } }
                      class B < A { name() { return \"B>\" + super.name(); } }
                      class C < B {}
                      var c = C();
                      c.tag = \"x\";
                      print c.name();";

        assert_eq!(output_of(source), "B>A:x\n");
    }

    #[test]
    fn test_superclass_must_be_a_class() {
        assert_eq!(
            runtime_error_of("var A = 1; class B < A {}"),
            "Superclass must be a class."
        );
    }

    #[test]
    fn test_super_method_missing() {
        assert_eq!(
            runtime_error_of("class A {} class B < A { m() { return super.nope(); } } B().m();"),
            "Undefined property 'nope'."
        );
    }

    #[test]
    fn test_clock_is_a_number() {
        let mut session = Session::new();

        match session.lox.evaluate_expression("clock()") {
            Some(Value::Number(seconds)) => assert!(seconds > 0.0),
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn test_globals_persist_across_runs() {
        let mut session = Session::new();

        assert_eq!(session.run("var counter = 0;"), RunOutcome::Completed);
        assert_eq!(
            session.run("fun bump() { counter = counter + 1; return counter; }"),
            RunOutcome::Completed
        );
        assert_eq!(session.run("bump(); bump();"), RunOutcome::Completed);

        assert_eq!(session.lox.evaluate_expression("counter"), Some(Value::Number(2.0)));
        assert_eq!(session.lox.evaluate_expression("bump()"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_closures_from_earlier_runs_keep_working() {
        let mut session = Session::new();

        session.run(
            "fun makeCounter() { var i = 0; fun count() { i = i + 1; return i; } return count; }
             var c = makeCounter();",
        );
        session.run("print c();");
        session.run("print c();");

        assert_eq!(session.printed(), "1\n2\n");
    }

    #[test]
    fn test_session_recovers_after_errors() {
        let mut session = Session::new();

        assert_eq!(session.run("{ var x = 1; print missing; }"), RunOutcome::RuntimeError);
        assert_eq!(session.run("print ;"), RunOutcome::StaticError);
        assert_eq!(session.run("var y = 2; print y;"), RunOutcome::Completed);

        assert_eq!(session.printed(), "2\n");
        assert_eq!(session.lox.interpreter().global("x"), None);
    }

    #[test]
    fn test_is_expression_probe() {
        assert!(is_expression("1 + 2"));
        assert!(is_expression("counter"));
        assert!(is_expression("a = 3"));

        assert!(!is_expression("print 1;"));
        assert!(!is_expression("var a = 1;"));
        assert!(!is_expression("1 +"));
        assert!(!is_expression("1 2"));
    }
}
