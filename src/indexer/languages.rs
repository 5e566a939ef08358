use tree_sitter::Language;

/// Which import-record builder applies to a grammar's import nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    EcmaScript,
    Python,
    Rust,
    Go,
}

/// Grammar plus queries for one language. Definition queries capture
/// `@name` and `@definition`, call queries `@call`, import queries `@import`
/// on the whole statement.
pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub definition_query: &'static str,
    pub call_query: &'static str,
    pub import_query: &'static str,
    pub import_style: ImportStyle,
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![
            javascript_config(),
            typescript_config(),
            tsx_config(),
            python_config(),
            rust_config(),
            go_config(),
        ]
    }
}

const ECMASCRIPT_DEFINITIONS: &str = r#"
(function_declaration
  name: (identifier) @name) @definition

(generator_function_declaration
  name: (identifier) @name) @definition

(method_definition
  name: (property_identifier) @name) @definition

(variable_declarator
  name: (identifier) @name
  value: [(arrow_function) (function_expression)]) @definition
"#;

const ECMASCRIPT_CALLS: &str = r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
"#;

const ECMASCRIPT_IMPORTS: &str = r#"
(import_statement) @import
"#;

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        language: tree_sitter_javascript::LANGUAGE.into(),
        extensions: &["js", "jsx", "mjs", "cjs"],
        definition_query: ECMASCRIPT_DEFINITIONS,
        call_query: ECMASCRIPT_CALLS,
        import_query: ECMASCRIPT_IMPORTS,
        import_style: ImportStyle::EcmaScript,
    }
}

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        extensions: &["ts", "mts", "cts"],
        definition_query: ECMASCRIPT_DEFINITIONS,
        call_query: ECMASCRIPT_CALLS,
        import_query: ECMASCRIPT_IMPORTS,
        import_style: ImportStyle::EcmaScript,
    }
}

fn tsx_config() -> LanguageConfig {
    LanguageConfig {
        name: "tsx",
        language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        extensions: &["tsx"],
        definition_query: ECMASCRIPT_DEFINITIONS,
        call_query: ECMASCRIPT_CALLS,
        import_query: ECMASCRIPT_IMPORTS,
        import_style: ImportStyle::EcmaScript,
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        language: tree_sitter_python::LANGUAGE.into(),
        extensions: &["py"],
        definition_query: r#"
(function_definition
  name: (identifier) @name) @definition
"#,
        call_query: r#"
(call
  function: (identifier) @call)
(call
  function: (attribute
    attribute: (identifier) @call))
"#,
        import_query: r#"
(import_statement) @import
(import_from_statement) @import
"#,
        import_style: ImportStyle::Python,
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        name: "rust",
        language: tree_sitter_rust::LANGUAGE.into(),
        extensions: &["rs"],
        definition_query: r#"
(function_item
  name: (identifier) @name) @definition
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (field_expression
    field: (field_identifier) @call))
(call_expression
  function: (scoped_identifier
    name: (identifier) @call))
"#,
        import_query: r#"
(use_declaration) @import
"#,
        import_style: ImportStyle::Rust,
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        name: "go",
        language: tree_sitter_go::LANGUAGE.into(),
        extensions: &["go"],
        definition_query: r#"
(function_declaration
  name: (identifier) @name) @definition

(method_declaration
  name: (field_identifier) @name) @definition
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (selector_expression
    field: (field_identifier) @call))
"#,
        import_query: r#"
(import_spec) @import
"#,
        import_style: ImportStyle::Go,
    }
}
