use super::*;

fn imports(source: &str) -> Vec<(String, ImportKind)> {
    scan_module(source)
        .unwrap()
        .imports
        .into_iter()
        .map(|import| (import.value, import.kind))
        .collect()
}

#[test]
fn static_and_reexport_specifiers() {
    let source = r#"import a, { b as c } from "./a.js"
import './side.css'
import * as ns from "vue"
export { d } from '../d'
export * from "star"
"#;
    let scan = scan_module(source).unwrap();
    let values: Vec<&str> = scan.imports.iter().map(|i| i.value.as_str()).collect();
    assert_eq!(values, vec!["./a.js", "./side.css", "vue", "../d", "star"]);
    for import in &scan.imports {
        assert_eq!(&source[import.start..import.end], import.value);
    }
    assert_eq!(scan.imports[3].kind, ImportKind::ExportFrom);
    assert!(scan.has_star_reexport);
    assert_eq!(scan.export_count, 2);
}

#[test]
fn dynamic_imports() {
    let source = "const m = import('./lazy.js');\nimport(base + '/x.js').then(run)";
    let scan = scan_module(source).unwrap();

    let literal = &scan.imports[0];
    assert_eq!(literal.kind, ImportKind::DynamicLiteral);
    assert_eq!(literal.value, "./lazy.js");
    assert_eq!(&source[literal.start..literal.end], "'./lazy.js'");

    let expr = &scan.imports[1];
    assert_eq!(expr.kind, ImportKind::DynamicExpr);
    assert_eq!(expr.value, "base + '/x.js'");
    assert!(expr.is_dynamic());
}

#[test]
fn ignores_comments_strings_and_templates() {
    let source = r#"// import x from "no"
/* import("no") */
const s = "import y from 'no'";
const t = `import ${`nested ${value}`} from 'no'`;
obj.import('no');
import real from "./real.js";
"#;
    assert_eq!(
        imports(source),
        vec![("./real.js".to_string(), ImportKind::Static)]
    );
}

#[test]
fn regex_literals_do_not_open_strings() {
    let source = "const re = /['\"]/g;\nconst half = total / 2;\nimport a from './a.js'";
    assert_eq!(imports(source), vec![("./a.js".to_string(), ImportKind::Static)]);
}

#[test]
fn unterminated_constructs_fail() {
    let err = scan_module("import a from \"./a.js").unwrap_err();
    assert_eq!(err.construct, "string literal");
    assert_eq!(err.offset, 14);

    assert_eq!(scan_module("/* open").unwrap_err().construct, "block comment");
    assert_eq!(scan_module("const t = `abc").unwrap_err().construct, "template literal");
}

#[test]
fn export_counts() {
    let scan = scan_module("export default 1;\nexport const a = 2;\nexport * as ns from './x'").unwrap();
    assert_eq!(scan.export_count, 3);
    assert!(!scan.has_star_reexport);

    let scan = scan_module("module.exports = {}").unwrap();
    assert_eq!(scan.export_count, 0);
}

#[test]
fn meta_flags() {
    let scan = scan_module("console.log(import.meta.env.MODE, import.meta.url)").unwrap();
    assert!(scan.has_env);
    assert!(!scan.has_hot);

    let scan = scan_module("if (import.meta.hot) {}").unwrap();
    assert!(scan.has_hot);
    assert!(scan.hot_calls.is_empty());
}

#[test]
fn import_meta_is_never_an_import() {
    let source = "const u = new URL('./a.png', import.meta.url)\nimport.meta.env\nimport(name)";
    assert_eq!(imports(source), vec![("name".to_string(), ImportKind::DynamicExpr)]);
}

#[test]
fn guarded_self_accept() {
    let source = "if (import.meta.hot) {\n  import.meta.hot.accept((mod) => render(mod))\n}";
    let scan = scan_module(source).unwrap();
    assert_eq!(
        scan.hot_calls,
        vec![HotCall {
            method: HotMethod::Accept,
            arg: HotArg::Callback,
            context: HotContext::Guarded,
            start: 25,
        }]
    );
}

#[test]
fn top_level_and_conditional_calls() {
    let source = "import.meta.hot.accept()\nif (debug) { import.meta.hot.acceptDeps(['./a.js', dep], cb) }";
    let scan = scan_module(source).unwrap();

    assert_eq!(scan.hot_calls[0].context, HotContext::TopLevel);
    assert_eq!(scan.hot_calls[0].arg, HotArg::None);

    let call = &scan.hot_calls[1];
    assert_eq!(call.method, HotMethod::AcceptDeps);
    assert_eq!(call.context, HotContext::Conditional);
    let HotArg::Array { deps, non_literal } = &call.arg else {
        panic!("expected array argument, got {:?}", call.arg);
    };
    assert!(non_literal);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].value, "./a.js");
    assert_eq!(&source[deps[0].start..deps[0].end], "'./a.js'");
}

#[test]
fn braceless_guard_and_decline() {
    let source = "if (import.meta.hot) import.meta.hot.accept('./dep.js')\nimport.meta.hot.decline()";
    let scan = scan_module(source).unwrap();

    let first = &scan.hot_calls[0];
    assert_eq!(first.context, HotContext::Guarded);
    let HotArg::Str(dep) = &first.arg else {
        panic!("expected string argument");
    };
    assert_eq!(dep.value, "./dep.js");

    let second = &scan.hot_calls[1];
    assert_eq!(second.method, HotMethod::Decline);
    assert_eq!(second.context, HotContext::TopLevel);
}

#[test]
fn callback_and_invalid_arguments() {
    let args = |source: &str| -> Vec<HotArg> {
        scan_module(source)
            .unwrap()
            .hot_calls
            .into_iter()
            .map(|call| call.arg)
            .collect()
    };
    assert_eq!(args("import.meta.hot.accept(function () {})"), vec![HotArg::Callback]);
    assert_eq!(args("import.meta.hot.accept(async () => {})"), vec![HotArg::Callback]);
    assert_eq!(args("import.meta.hot.accept(m => m)"), vec![HotArg::Callback]);
    assert_eq!(args("import.meta.hot.accept(handler)"), vec![HotArg::Invalid]);
    assert_eq!(args("import.meta.hot.accept(42)"), vec![HotArg::Invalid]);
}

#[test]
fn narrow_specifier_interface() {
    let specifiers = scan_specifiers("import a from './a.js'; import('./b.js')").unwrap();
    assert_eq!(specifiers.len(), 2);
    assert!(!specifiers[0].is_dynamic);
    assert!(specifiers[1].is_dynamic);
    assert_eq!(specifiers[1].value, "./b.js");
}

#[test]
fn shebang_is_skipped() {
    let source = "#!/usr/bin/env node\nimport fs from 'fs'";
    assert_eq!(imports(source), vec![("fs".to_string(), ImportKind::Static)]);
}
