//! # AST Analyzer
//!
//! Parses JavaScript source into a tree-sitter concrete syntax tree and
//! walks it looking for the capability-abuse and obfuscation shapes named
//! in spec §4.3.3. Parsing is best-effort: tree-sitter never refuses input
//! outright, so a tree containing `ERROR` nodes is itself treated as a weak
//! obfuscation signal rather than a hard failure.

use std::sync::OnceLock;

use regex::Regex;
use scanner_core::{Artifact, Confidence, ContentKind, PackageRef, Severity, Threat, ThreatKind};
use tree_sitter::{Language, Node, Parser, Tree};
use tree_sitter_javascript::LANGUAGE as JAVASCRIPT;

fn javascript_language() -> Language {
    JAVASCRIPT.into()
}

const CAPABILITY_MODULES: &[&str] = &["fs", "child_process", "vm", "net", "tls"];
const STRING_TIMER_FUNCTIONS: &[&str] = &["setTimeout", "setInterval"];

fn obfuscated_identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^_0x[a-f0-9]{4,6}$").expect("obfuscated identifier pattern is valid"))
}

fn base64ish_literal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]{80,}={0,2}$").expect("base64-ish literal pattern is valid"))
}

/// Parses and visits JavaScript artifacts for capability abuse.
pub struct AstAnalyzer {
    parser: Parser,
}

impl AstAnalyzer {
    pub fn new() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&javascript_language())
            .expect("load javascript grammar");
        Self { parser }
    }

    /// Parse and visit `source`. Non-source artifacts (manifests, text,
    /// opaque binaries) are skipped; the AST visitor has nothing to say
    /// about them.
    #[must_use]
    pub fn analyze(&mut self, artifact: &Artifact, file_path: &str, source: &str) -> Vec<Threat> {
        if artifact.content_kind != ContentKind::Source {
            return Vec::new();
        }

        let package = &artifact.package;
        let Some(tree) = self.parser.parse(source, None) else {
            return vec![obfuscated_code_threat(package, file_path, None, "parser could not produce a tree")];
        };

        let mut threats = Visitor::new(package, file_path, source).run(&tree);

        if tree.root_node().has_error() {
            threats.push(obfuscated_code_threat(
                package,
                file_path,
                None,
                "best-effort parse contains syntax errors",
            ));
        }

        threats
    }
}

impl Default for AstAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

struct Visitor<'a> {
    package: &'a PackageRef,
    file_path: &'a str,
    source: &'a str,
    threats: Vec<Threat>,
    identifier_count: usize,
    single_letter_identifier_count: usize,
}

impl<'a> Visitor<'a> {
    fn new(package: &'a PackageRef, file_path: &'a str, source: &'a str) -> Self {
        Self {
            package,
            file_path,
            source,
            threats: Vec::new(),
            identifier_count: 0,
            single_letter_identifier_count: 0,
        }
    }

    fn run(mut self, tree: &Tree) -> Vec<Threat> {
        let root = tree.root_node();
        let mut cursor = root.walk();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            self.visit(node);
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }

        if self.identifier_count >= 20
            && self.single_letter_identifier_count as f64 / self.identifier_count as f64 > 0.3
        {
            self.threats.push(obfuscated_code_threat(
                self.package,
                self.file_path,
                None,
                "unusually high proportion of single-letter identifiers",
            ));
        }

        self.threats
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn line(&self, node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "identifier" | "property_identifier" | "shorthand_property_identifier" => {
                self.visit_identifier(node);
            }
            "string" => self.visit_string(node),
            "assignment_expression" => self.visit_assignment(node),
            "call_expression" => self.visit_call(node),
            "new_expression" => self.visit_new(node),
            _ => {}
        }
    }

    fn visit_identifier(&mut self, node: Node) {
        let text = self.text(node);
        self.identifier_count += 1;
        if text.chars().count() == 1 {
            self.single_letter_identifier_count += 1;
        }
        if obfuscated_identifier_pattern().is_match(text) {
            self.threats.push(obfuscated_code_threat(
                self.package,
                self.file_path,
                Some(self.line(node)),
                "identifier matches the packer-hoisted `_0x` naming scheme",
            ));
        }
    }

    fn visit_string(&mut self, node: Node) {
        let text = self.text(node);
        let inner = text.trim_matches(|c| c == '"' || c == '\'' || c == '`');
        if base64ish_literal_pattern().is_match(inner) {
            self.threats.push(obfuscated_code_threat(
                self.package,
                self.file_path,
                Some(self.line(node)),
                "long base64-like string literal",
            ));
        }
        if inner.contains("eth_sendTransaction") {
            self.threats.push(
                Threat::new(
                    ThreatKind::NetworkManipulation,
                    Severity::High,
                    0.7,
                    "references the eth_sendTransaction RPC method alongside wallet provider access",
                    self.package.clone(),
                )
                .with_location(self.file_path, Some(self.line(node))),
            );
        }
    }

    fn visit_assignment(&mut self, node: Node) {
        let Some(left) = node.child_by_field_name("left") else { return };
        let left_text = self.text(left);

        if is_wallet_target(left_text) {
            self.threats.push(
                Threat::new(
                    ThreatKind::WalletHijacking,
                    Severity::Critical,
                    0.9,
                    format!("assignment to wallet provider object `{left_text}`"),
                    self.package.clone(),
                )
                .with_location(self.file_path, Some(self.line(node))),
            );
        }

        if is_network_api_target(left_text) {
            self.threats.push(
                Threat::new(
                    ThreatKind::NetworkManipulation,
                    Severity::High,
                    0.8,
                    format!("reassignment of request API `{left_text}`"),
                    self.package.clone(),
                )
                .with_location(self.file_path, Some(self.line(node))),
            );
        }
    }

    fn visit_call(&mut self, node: Node) {
        let Some(callee) = node.child_by_field_name("function") else { return };
        let callee_text = self.text(callee);
        let args = node.child_by_field_name("arguments");
        let line = Some(self.line(node));

        match callee_text {
            "eval" => self.threats.push(dynamic_code_threat(
                self.package,
                self.file_path,
                line,
                ThreatKind::EvalUsage,
                "direct eval() call",
            )),
            "require" => {
                if let Some(arg) = args.and_then(|a| a.named_child(0)) {
                    if arg.kind() == "string" {
                        let module = self.text(arg).trim_matches(|c| c == '"' || c == '\'');
                        if CAPABILITY_MODULES.contains(&module) {
                            self.threats.push(
                                Threat::new(
                                    ThreatKind::SuspiciousModule,
                                    Severity::Medium,
                                    0.6,
                                    format!("requires host-capability module `{module}`"),
                                    self.package.clone(),
                                )
                                .with_location(self.file_path, line),
                            );
                        }
                    } else {
                        self.threats.push(dynamic_code_threat(
                            self.package,
                            self.file_path,
                            line,
                            ThreatKind::DynamicRequire,
                            "require() called with a non-literal argument",
                        ));
                    }
                }
            }
            other if STRING_TIMER_FUNCTIONS.contains(&other) => {
                if args
                    .and_then(|a| a.named_child(0))
                    .is_some_and(|arg| arg.kind() == "string")
                {
                    self.threats.push(dynamic_code_threat(
                        self.package,
                        self.file_path,
                        line,
                        ThreatKind::StringTimer,
                        &format!("{other}() invoked with a string body instead of a function"),
                    ));
                }
            }
            "Function" => self.threats.push(dynamic_code_threat(
                self.package,
                self.file_path,
                line,
                ThreatKind::FunctionConstructor,
                "Function() used to compile code from a string",
            )),
            _ if is_wallet_proxy_install(callee_text, node, self) => {
                self.threats.push(
                    Threat::new(
                        ThreatKind::WalletHijacking,
                        Severity::Critical,
                        0.85,
                        format!("property-descriptor install against `{callee_text}`"),
                        self.package.clone(),
                    )
                    .with_location(self.file_path, line),
                );
            }
            _ => {}
        }
    }

    fn visit_new(&mut self, node: Node) {
        let Some(callee) = node.child_by_field_name("constructor") else { return };
        let callee_text = self.text(callee);
        let line = Some(self.line(node));

        if callee_text == "Function" {
            self.threats.push(dynamic_code_threat(
                self.package,
                self.file_path,
                line,
                ThreatKind::FunctionConstructor,
                "new Function() used to compile code from a string",
            ));
        }

        if callee_text == "Proxy" {
            if let Some(args) = node.child_by_field_name("arguments") {
                let args_text = self.text(args);
                if args_text.contains("ethereum") {
                    self.threats.push(
                        Threat::new(
                            ThreatKind::WalletHijacking,
                            Severity::Critical,
                            0.85,
                            "Proxy wrapper installed around a wallet provider object",
                            self.package.clone(),
                        )
                        .with_location(self.file_path, line),
                    );
                }
            }
        }
    }
}

fn is_wallet_target(text: &str) -> bool {
    text.contains("window.ethereum") || text.contains("globalThis.ethereum")
}

fn is_network_api_target(text: &str) -> bool {
    text == "fetch" || text == "window.fetch" || text.contains("XMLHttpRequest.prototype.open")
}

fn is_wallet_proxy_install(callee_text: &str, node: Node, visitor: &Visitor) -> bool {
    if callee_text != "Object.defineProperty" && callee_text != "Object.defineProperties" {
        return false;
    }
    node.child_by_field_name("arguments")
        .map(|args| visitor.text(args).contains("ethereum"))
        .unwrap_or(false)
}

fn obfuscated_code_threat(
    package: &PackageRef,
    file_path: &str,
    line_number: Option<u32>,
    reason: &str,
) -> Threat {
    Threat::new(ThreatKind::ObfuscatedCode, Severity::Low, 0.5, reason, package.clone())
        .with_location(file_path, line_number)
}

fn dynamic_code_threat(
    package: &PackageRef,
    file_path: &str,
    line_number: Option<u32>,
    kind: ThreatKind,
    message: &str,
) -> Threat {
    Threat::new(kind, Severity::High, 0.7, message, package.clone()).with_location(file_path, line_number)
}
