use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

const CHECK_V1_IMPORT: &str = "\"gopkg.in/check.v1\"";
const SUITE_DISPATCH_CALL: &str = "suite.Run(";

static TEST_FUNC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Test.*|^Example.*").expect("test pattern is valid"));
static TEST_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(([^)]+)\)\.(Test.*)$").expect("suite method pattern is valid")
});
static BENCHMARK_FUNC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Benchmark.*").expect("benchmark pattern is valid"));
static FUNC_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s*(?:\(([^)]*)\)\s*)?([A-Za-z_][A-Za-z0-9_]*)\s*[(\[]")
        .expect("func declaration pattern is valid")
});
static IMPORT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:import\s+)?(?:[A-Za-z_.][A-Za-z0-9_]*\s+)?("[^"]+")\s*$"#)
        .expect("import spec pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Byte range of the declaration in the source text.
    pub range: Range<usize>,
    pub children: Vec<DocumentSymbol>,
}

/// Produces the top-level symbols of a Go source file, in source order.
pub trait SymbolProvider {
    fn provide_symbols(&self, source: &str) -> Vec<DocumentSymbol>;
}

/// Line-oriented declaration scanner for gofmt-formatted Go source.
///
/// Imports become [`SymbolKind::Namespace`] symbols named by their quoted
/// path. Methods are named `(Receiver).Name`, with `*` kept for pointer
/// receivers. A function body ends at the first `}` in column zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoOutline;

impl SymbolProvider for GoOutline {
    fn provide_symbols(&self, source: &str) -> Vec<DocumentSymbol> {
        let lines = line_spans(source);
        let mut symbols = Vec::new();
        let mut in_import_block = false;
        let mut index = 0usize;
        while index < lines.len() {
            let (start, end) = lines[index];
            let line = &source[start..end];

            if in_import_block {
                if line.trim_start().starts_with(')') {
                    in_import_block = false;
                } else if let Some(symbol) = import_symbol(line, start) {
                    symbols.push(symbol);
                }
                index += 1;
                continue;
            }
            if line.starts_with("import") {
                if line.trim_end().ends_with('(') {
                    in_import_block = true;
                } else if let Some(symbol) = import_symbol(line, start) {
                    symbols.push(symbol);
                }
                index += 1;
                continue;
            }

            let Some(captures) = FUNC_DECL.captures(line) else {
                index += 1;
                continue;
            };
            let name = match captures.get(1) {
                Some(receiver) => format!("({}).{}", receiver_type(receiver.as_str()), &captures[2]),
                None => captures[2].to_owned(),
            };
            let mut last = index;
            if !line.trim_end().ends_with('}') {
                while last + 1 < lines.len() {
                    last += 1;
                    let (body_start, body_end) = lines[last];
                    if source[body_start..body_end].starts_with('}') {
                        break;
                    }
                }
            }
            symbols.push(DocumentSymbol {
                name,
                kind: SymbolKind::Function,
                range: start..lines[last].1,
                children: Vec::new(),
            });
            index = last + 1;
        }
        symbols
    }
}

fn line_spans(source: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for line in source.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        spans.push((start, start + content.len()));
        start += line.len();
    }
    spans
}

fn import_symbol(line: &str, offset: usize) -> Option<DocumentSymbol> {
    let path = IMPORT_SPEC.captures(line)?.get(1)?;
    Some(DocumentSymbol {
        name: path.as_str().to_owned(),
        kind: SymbolKind::Namespace,
        range: offset + path.start()..offset + path.end(),
        children: Vec::new(),
    })
}

/// `s *MySuite` → `*MySuite`, `MySuite` → `MySuite`.
fn receiver_type(receiver: &str) -> String {
    let receiver = receiver.trim();
    let ty = receiver.rsplit_once(char::is_whitespace).map_or(receiver, |(_, ty)| ty);
    ty.replace(' ', "")
}

/// Test and example functions. Suite methods count when the file imports
/// `gopkg.in/check.v1`.
pub fn test_functions(symbols: &[DocumentSymbol]) -> Vec<DocumentSymbol> {
    let check_v1 = symbols
        .iter()
        .any(|symbol| symbol.kind == SymbolKind::Namespace && symbol.name == CHECK_V1_IMPORT);
    symbols
        .iter()
        .filter(|symbol| {
            symbol.kind == SymbolKind::Function
                && (TEST_FUNC.is_match(&symbol.name)
                    || (check_v1 && TEST_METHOD.is_match(&symbol.name)))
        })
        .cloned()
        .collect()
}

pub fn benchmark_functions(symbols: &[DocumentSymbol]) -> Vec<DocumentSymbol> {
    symbols
        .iter()
        .filter(|symbol| {
            symbol.kind == SymbolKind::Function && BENCHMARK_FUNC.is_match(&symbol.name)
        })
        .cloned()
        .collect()
}

/// `(*testSuite).TestMethod` → `TestMethod`.
pub fn extract_instance_test_name(symbol_name: &str) -> Option<&str> {
    TEST_METHOD
        .captures(symbol_name)
        .and_then(|captures| captures.get(2))
        .map(|method| method.as_str())
}

/// Plain test functions whose body dispatches a suite with `suite.Run(`.
pub fn find_all_test_suite_runs<'a>(
    source: &str,
    tests: &'a [DocumentSymbol],
) -> Vec<&'a DocumentSymbol> {
    tests
        .iter()
        .filter(|test| !TEST_METHOD.is_match(&test.name))
        .filter(|test| {
            source
                .get(test.range.clone())
                .is_some_and(|body| body.contains(SUITE_DISPATCH_CALL))
        })
        .collect()
}

/// Flags for running one function directly through a compiled test binary.
pub fn test_function_debug_args(function_name: &str) -> Vec<String> {
    if BENCHMARK_FUNC.is_match(function_name) {
        return vec![
            "-test.bench".to_owned(),
            format!("^{function_name}$"),
            "-test.run".to_owned(),
            "a^".to_owned(),
        ];
    }
    if let Some(method) = extract_instance_test_name(function_name) {
        return vec!["-check.f".to_owned(), format!("^{method}$")];
    }
    vec!["-test.run".to_owned(), format!("^{function_name}$")]
}

#[cfg(test)]
#[path = "tests/symbols_tests.rs"]
mod tests;
