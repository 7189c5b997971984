#[cfg(test)]
mod resolver_tests {
    use rox::ast::Stmt;
    use rox::error::{Diagnostic, DiagnosticCollector, Severity};
    use rox::parser::Parser;
    use rox::resolver::{Resolution, Resolver, SymbolKind};
    use rox::scanner::Scanner;

    fn parse(source: &str) -> Vec<Stmt> {
        let mut collector = DiagnosticCollector::new();
        let statements = Parser::new(Scanner::new(source), &mut collector).parse();
        assert!(
            !collector.has_errors(),
            "unexpected parse errors: {:?}",
            collector.diagnostics
        );
        statements
    }

    fn resolve(source: &str) -> (Resolution, Vec<Diagnostic>) {
        let statements = parse(source);
        let mut collector = DiagnosticCollector::new();
        let resolution = Resolver::new(&mut collector).resolve(&statements);
        (resolution, collector.into_diagnostics())
    }

    fn errors(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.as_str())
            .collect()
    }

    fn warnings(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| d.message.as_str())
            .collect()
    }

    #[test]
    fn test_clean_program_has_no_diagnostics() {
        let (_, diagnostics) = resolve(
            "fun add(a, b) { return a + b; }
             class Point { init(x) { this.x = x; } }
             print add(1, 2);
             print Point(1).x;",
        );

        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_redeclaration_reported_once() {
        let (_, diagnostics) = resolve("var a; var a; print a;");

        assert_eq!(
            errors(&diagnostics),
            vec!["Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_redeclaration_in_block() {
        let (_, diagnostics) = resolve("{ var a = 1; var a = 2; print a; }");

        assert_eq!(
            errors(&diagnostics),
            vec!["Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_static_error_points_at_the_offending_name() {
        let (_, diagnostics) = resolve("var a; var a; print a;");
        let error = diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
            .expect("redeclaration");

        assert_eq!((error.position.start, error.position.end), (11, 12));
        assert_eq!(error.position.line, 1);
    }

    #[test]
    fn test_unused_variable_warned_once() {
        let (_, diagnostics) = resolve("var a;");

        assert!(errors(&diagnostics).is_empty());
        assert_eq!(
            warnings(&diagnostics),
            vec!["Variable 'a' is declared but never used."]
        );
    }

    #[test]
    fn test_unused_warnings_follow_declaration_order() {
        let (_, diagnostics) = resolve("var b; fun f(x) { var c; } f(1);");

        assert_eq!(
            warnings(&diagnostics),
            vec![
                "Variable 'b' is declared but never used.",
                "Variable 'x' is declared but never used.",
                "Variable 'c' is declared but never used.",
            ]
        );
    }

    #[test]
    fn test_reading_in_own_initializer() {
        let (_, diagnostics) = resolve("{ var a = 1; { var a = a; } }");

        assert_eq!(
            errors(&diagnostics),
            vec!["Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn test_misplaced_return() {
        let (_, diagnostics) = resolve("return 1;");
        assert_eq!(errors(&diagnostics), vec!["Can't return from top-level code."]);

        let (_, diagnostics) = resolve("class A { init() { return 1; } } A();");
        assert_eq!(
            errors(&diagnostics),
            vec!["Can't return a value from an initializer."]
        );

        // a bare return is fine in an initializer
        let (_, diagnostics) = resolve("class A { init() { return; } } A();");
        assert!(errors(&diagnostics).is_empty());
    }

    #[test]
    fn test_misplaced_this_and_super() {
        let (_, diagnostics) = resolve("print this;");
        assert_eq!(errors(&diagnostics), vec!["Can't use 'this' outside of a class."]);

        let (_, diagnostics) = resolve("fun f() { super.m(); } f();");
        assert_eq!(errors(&diagnostics), vec!["Can't use 'super' outside of a class."]);

        let (_, diagnostics) = resolve("class A { m() { super.m(); } } A();");
        assert_eq!(
            errors(&diagnostics),
            vec!["Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn test_class_cannot_inherit_from_itself() {
        let (_, diagnostics) = resolve("class A < A {}");

        assert_eq!(errors(&diagnostics), vec!["A class can't inherit from itself."]);
    }

    #[test]
    fn test_break_and_continue_outside_loop() {
        let (_, diagnostics) = resolve("break; continue;");
        assert_eq!(
            errors(&diagnostics),
            vec!["Can't break outside of a loop.", "Can't continue outside of a loop."]
        );

        let (_, diagnostics) = resolve("while (true) { if (true) break; else continue; }");
        assert!(errors(&diagnostics).is_empty());
    }

    #[test]
    fn test_loop_depth_does_not_leak_into_functions() {
        let (_, diagnostics) = resolve("while (true) { fun f() { break; } f(); }");

        assert_eq!(errors(&diagnostics), vec!["Can't break outside of a loop."]);
    }

    #[test]
    fn test_resolution_continues_after_errors() {
        let (_, diagnostics) = resolve("return; print this; break;");

        assert_eq!(errors(&diagnostics).len(), 3);
    }

    #[test]
    fn test_distances() {
        let source = "var a = 1; { var b = 2; { print a + b; } }";
        let (resolution, _) = resolve(source);

        let mut distances: Vec<usize> = resolution.locals.values().copied().collect();
        distances.sort();

        // `a` is two scopes out (top level), `b` one
        assert_eq!(distances, vec![1, 2]);
    }

    #[test]
    fn test_undeclared_names_stay_global() {
        let (resolution, _) = resolve("print clock(); fun f() { return g(); } fun g() { return 1; } f();");

        // `clock` and the forward reference `g` are not in the table;
        // the call `f()` is
        assert_eq!(resolution.locals.len(), 1);
    }

    #[test]
    fn test_resolving_twice_is_idempotent() {
        let statements = parse(
            "var a = 1;
             fun outer() { var b = a; fun inner() { return b; } return inner; }
             class A { m() { return this; } }
             class B < A { m() { return super.m(); } }
             print outer()();",
        );

        let mut first = DiagnosticCollector::new();
        let mut second = DiagnosticCollector::new();

        let one = Resolver::new(&mut first).resolve(&statements);
        let two = Resolver::new(&mut second).resolve(&statements);

        assert_eq!(one.locals, two.locals);
        assert_eq!(one.symbols, two.symbols);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_symbol_graph_links_uses_to_definitions() {
        let (resolution, _) = resolve("var a = 1; fun f(p) { return p + a; } a = f(a);");
        let symbols = &resolution.symbols;

        let kinds: Vec<(&str, SymbolKind)> = symbols
            .definitions()
            .iter()
            .map(|d| (d.token.lexeme.as_str(), d.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a", SymbolKind::Variable),
                ("f", SymbolKind::Function),
                ("p", SymbolKind::Parameter),
            ]
        );

        let a = &symbols.definitions()[0];
        assert_eq!(a.references.len(), 3);
        for reference in &a.references {
            assert_eq!(reference.lexeme, "a");
            let target = symbols.definition_of(reference.id).expect("linked");
            assert_eq!(target.token.id, a.token.id);
            assert_eq!(symbols.lookup(reference.id), Some(a));
        }

        // declarations find themselves, but are not uses of anything
        assert_eq!(symbols.definition(a.token.id), Some(a));
        assert_eq!(symbols.lookup(a.token.id), Some(a));
        assert!(symbols.definition_of(a.token.id).is_none());

        assert_eq!(symbols.definitions()[1].references.len(), 1);
        assert_eq!(symbols.definitions()[2].references.len(), 1);
        assert!(symbols.unused().next().is_none());
    }

    #[test]
    fn test_shadowed_names_link_to_the_nearest_definition() {
        let (resolution, _) = resolve("var a = 1; { var a = 2; print a; } print a;");
        let definitions = resolution.symbols.definitions();

        assert_eq!(definitions.len(), 2);
        // outer `a` is read once at top level, inner `a` once in the block
        assert_eq!(definitions[0].references.len(), 1);
        assert_eq!(definitions[1].references.len(), 1);
        assert!(definitions[0].references[0].start > definitions[1].references[0].start);
    }

    #[test]
    fn test_superclass_counts_as_a_use() {
        let (resolution, diagnostics) = resolve("class A {} class B < A {} print B;");

        assert!(warnings(&diagnostics).is_empty(), "{:?}", diagnostics);
        assert_eq!(resolution.symbols.definitions()[0].kind, SymbolKind::Class);
    }
}
