use std::path::Path;

use kiln_core::resolver::{Resolver, ResolverOptions};
use proptest::prelude::*;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "package.json", r#"{"dependencies": {"foo": "1.0.0"}}"#);
    write(root, "src/main.js", "import './util'");
    write(root, "src/util.ts", "export const x = 1");
    write(root, "src/lib/index.js", "export default 1");
    write(root, "src/app/App.js", "");
    write(root, "src/shared/x.js", "");
    write(root, "public/favicon.ico", "");
    write(root, "node_modules/foo/package.json", r#"{"module": "dist/foo"}"#);
    write(root, "node_modules/foo/dist/foo.mjs", "export default 1");
    write(root, "node_modules/foo/style.css", "a{}");
    write(root, "node_modules/lodash-es/package.json", r#"{"main": "lodash.js"}"#);
    write(root, "node_modules/lodash-es/lodash.js", "");
    write(root, "node_modules/lodash-es/debounce.js", "");
    dir
}

fn resolver(root: &Path) -> Resolver {
    Resolver::new(ResolverOptions::new(root).alias("/@/", "/src/app"))
}

#[test]
fn request_to_file_completes_extensions_and_indexes() {
    let dir = project();
    let resolver = resolver(dir.path());

    assert_eq!(resolver.request_to_file("/src/util"), dir.path().join("src/util.ts"));
    assert_eq!(
        resolver.request_to_file("/src/lib?t=1"),
        dir.path().join("src/lib").join("index.js")
    );
    assert_eq!(
        resolver.request_to_file("/favicon.ico"),
        dir.path().join("public/favicon.ico")
    );
    assert_eq!(resolver.request_to_file("/@/App.js"), dir.path().join("src/app/App.js"));
    assert_eq!(
        resolver.request_to_file("/@modules/lodash-es/debounce"),
        dir.path().join("node_modules/lodash-es/debounce.js")
    );
}

#[test]
fn file_to_request_strips_public_and_reverses_aliases() {
    let dir = project();
    let resolver = resolver(dir.path());

    assert_eq!(resolver.file_to_request(&dir.path().join("src/main.js")), "/src/main.js");
    assert_eq!(
        resolver.file_to_request(&dir.path().join("public/favicon.ico")),
        "/favicon.ico"
    );
    assert_eq!(resolver.file_to_request(&dir.path().join("src/app/App.js")), "/@/App.js");
    assert!(resolver.is_public_request("/favicon.ico"));
    assert!(!resolver.is_public_request("/src/main.js"));
}

#[test]
fn normalization_keeps_query_and_virtual_paths() {
    let dir = project();
    let resolver = resolver(dir.path());

    assert_eq!(resolver.normalize_public_path("/src/util").unwrap(), "/src/util.ts");
    assert_eq!(
        resolver.normalize_public_path("/src/util?t=42").unwrap(),
        "/src/util.ts?t=42"
    );
    assert_eq!(
        resolver.normalize_public_path("/src/lib").unwrap(),
        "/src/lib/index.js"
    );
    assert_eq!(
        resolver.normalize_public_path("/@kiln/client").unwrap(),
        "/@kiln/client"
    );
    assert_eq!(
        resolver.normalize_public_path("/@modules/lodash-es/debounce").unwrap(),
        "/@modules/lodash-es/debounce.js"
    );
    assert_eq!(
        resolver.normalize_public_path("/@modules/foo").unwrap(),
        "/@modules/foo"
    );
}

#[test]
fn optimized_modules_live_in_the_cache_dir() {
    let dir = project();
    write(dir.path(), "node_modules/.kiln/foo.js", "export default 1");
    let resolver = resolver(dir.path());

    assert_eq!(resolver.cache_dir(), Some(dir.path().join("node_modules/.kiln").as_path()));
    assert_eq!(
        resolver.request_to_file("/@modules/foo.js"),
        dir.path().join("node_modules/.kiln/foo.js")
    );
    assert_eq!(
        resolver.normalize_public_path("/@modules/foo.js").unwrap(),
        "/@modules/foo.js"
    );
    assert_eq!(resolver.resolve_bare_specifier("foo", "/src/main.js"), "foo.js");
}

#[test]
fn bare_specifiers() {
    let dir = project();
    let resolver = resolver(dir.path());

    assert_eq!(resolver.resolve_bare_specifier("foo", "/src/main.js"), "foo/dist/foo.mjs");
    assert_eq!(
        resolver.request_to_file("/@modules/foo/dist/foo.mjs"),
        dir.path().join("node_modules/foo/dist/foo.mjs")
    );
    assert_eq!(
        resolver.resolve_bare_specifier("lodash-es/debounce", "/src/main.js"),
        "lodash-es/debounce.js"
    );
    assert_eq!(
        resolver.resolve_bare_specifier("foo/style.css", "/src/main.js"),
        "foo/style.css?import"
    );
    assert_eq!(resolver.resolve_bare_specifier("nope", "/src/main.js"), "nope?import");
}

#[test]
fn relative_requests_escaping_an_alias_use_the_real_path() {
    let dir = project();
    let resolver = resolver(dir.path());

    let plain = resolver.resolve_relative_request("/src/main.js", "./util?raw");
    assert_eq!(plain.pathname, "/src/util");
    assert_eq!(plain.query, "?raw");

    let inside = resolver.resolve_relative_request("/@/App.js", "./Other.js");
    assert_eq!(inside.pathname, "/@/Other.js");

    let escaped = resolver.resolve_relative_request("/@/App.js", "../shared/x.js");
    assert_eq!(escaped.pathname, "/src/shared/x.js");
}

#[test]
fn fuzzy_memo_is_invalidated_on_demand() {
    let dir = project();
    let resolver = resolver(dir.path());

    assert_eq!(resolver.request_to_file("/src/late"), dir.path().join("src/late"));
    write(dir.path(), "src/late.js", "");
    assert_eq!(resolver.request_to_file("/src/late"), dir.path().join("src/late"));

    resolver.invalidate_fuzzy();
    assert_eq!(resolver.request_to_file("/src/late"), dir.path().join("src/late.js"));
}

const REQUESTS: &[&str] = &[
    "/src/main.js",
    "/src/main",
    "/src/util",
    "/src/lib",
    "/src/lib/index",
    "/favicon.ico",
    "/@/App",
    "/@/App.js",
    "/missing/file.js",
    "/@modules/lodash-es/debounce",
    "/@modules/foo/dist/foo",
    "/@kiln/client",
];

proptest! {
    #[test]
    fn normalization_resolves_to_the_same_file(
        request in prop::sample::select(REQUESTS),
        timestamp in proptest::option::of(0u32..1000),
    ) {
        let dir = project();
        let resolver = resolver(dir.path());
        let request = match timestamp {
            Some(t) => format!("{request}?t={t}"),
            None => request.to_string(),
        };

        let normalized = resolver.normalize_public_path(&request).unwrap();
        prop_assert_eq!(resolver.request_to_file(&normalized), resolver.request_to_file(&request));
        prop_assert_eq!(resolver.normalize_public_path(&normalized).unwrap(), normalized);
    }
}

#[derive(Clone, Default)]
struct Captured(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn warnings_during(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = captured.0.lock().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn broken_package_entry_is_attributed_to_the_importer() {
    let dir = project();
    write(dir.path(), "node_modules/broken/package.json", r#"{"main": "gone.js"}"#);
    let resolver = resolver(dir.path());

    let mut resolved = String::new();
    let logs = warnings_during(|| {
        resolved = resolver.resolve_bare_specifier("broken", "/src/main.js");
    });

    assert!(resolved.starts_with("broken"));
    assert!(logs.contains("WARN"));
    assert!(logs.contains("dependency broken does not have default entry defined"));
    assert!(logs.contains("(imported by /src/main.js)"));
}

#[test]
fn deep_imports_fall_through_quietly() {
    let dir = project();
    let resolver = resolver(dir.path());

    let mut resolved = String::new();
    let logs = warnings_during(|| {
        resolved = resolver.resolve_bare_specifier("lodash-es/debounce", "/src/main.js");
    });

    assert_eq!(resolved, "lodash-es/debounce.js");
    assert!(logs.is_empty());
}
