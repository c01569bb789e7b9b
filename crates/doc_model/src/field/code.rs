//! Field code parsing: type tag, arguments and switches

use serde::{Deserialize, Serialize};

// =============================================================================
// Field types
// =============================================================================

/// Types of fields, named by their code keyword
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Current page number (PAGE)
    Page,
    /// Total number of pages (NUMPAGES)
    NumPages,
    /// Current section number (SECTION)
    Section,
    /// Pages in the current section (SECTIONPAGES)
    SectionPages,
    Date,
    Time,
    CreateDate,
    SaveDate,
    PrintDate,
    Author,
    Title,
    Subject,
    Comments,
    Keywords,
    LastSavedBy,
    FileName,
    UserName,
    UserInitials,
    UserAddress,
    DocProperty,
    DocVariable,
    /// Bookmark contents (REF)
    Ref,
    /// Page of a bookmark (PAGEREF)
    PageRef,
    If,
    Compare,
    /// Arithmetic formula (=)
    Formula,
    MergeField,
    /// Sequence numbering (SEQ)
    Seq,
    Quote,
    Hyperlink,
    NumWords,
    NumChars,
    /// Any keyword this engine does not evaluate
    Unknown(String),
    /// A field whose code has not been written yet
    #[default]
    None,
}

const KEYWORDS: &[(&str, FieldType)] = &[
    ("PAGE", FieldType::Page),
    ("NUMPAGES", FieldType::NumPages),
    ("SECTION", FieldType::Section),
    ("SECTIONPAGES", FieldType::SectionPages),
    ("DATE", FieldType::Date),
    ("TIME", FieldType::Time),
    ("CREATEDATE", FieldType::CreateDate),
    ("SAVEDATE", FieldType::SaveDate),
    ("PRINTDATE", FieldType::PrintDate),
    ("AUTHOR", FieldType::Author),
    ("TITLE", FieldType::Title),
    ("SUBJECT", FieldType::Subject),
    ("COMMENTS", FieldType::Comments),
    ("KEYWORDS", FieldType::Keywords),
    ("LASTSAVEDBY", FieldType::LastSavedBy),
    ("FILENAME", FieldType::FileName),
    ("USERNAME", FieldType::UserName),
    ("USERINITIALS", FieldType::UserInitials),
    ("USERADDRESS", FieldType::UserAddress),
    ("DOCPROPERTY", FieldType::DocProperty),
    ("DOCVARIABLE", FieldType::DocVariable),
    ("REF", FieldType::Ref),
    ("PAGEREF", FieldType::PageRef),
    ("IF", FieldType::If),
    ("COMPARE", FieldType::Compare),
    ("=", FieldType::Formula),
    ("MERGEFIELD", FieldType::MergeField),
    ("SEQ", FieldType::Seq),
    ("QUOTE", FieldType::Quote),
    ("HYPERLINK", FieldType::Hyperlink),
    ("NUMWORDS", FieldType::NumWords),
    ("NUMCHARS", FieldType::NumChars),
];

impl FieldType {
    /// Resolve a code keyword, case-insensitively
    pub fn from_keyword(keyword: &str) -> FieldType {
        if keyword.is_empty() {
            return FieldType::None;
        }
        KEYWORDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(keyword))
            .map(|(_, field_type)| field_type.clone())
            .unwrap_or_else(|| FieldType::Unknown(keyword.to_ascii_uppercase()))
    }

    /// The code keyword (e.g. "PAGE", "MERGEFIELD")
    pub fn keyword(&self) -> &str {
        match self {
            FieldType::Unknown(name) => name,
            FieldType::None => "",
            known => KEYWORDS
                .iter()
                .find(|(_, field_type)| field_type == known)
                .map(|(name, _)| *name)
                .unwrap_or(""),
        }
    }

    /// Whether the result depends on page counters
    pub fn depends_on_layout(&self) -> bool {
        matches!(
            self,
            FieldType::Page
                | FieldType::NumPages
                | FieldType::Section
                | FieldType::SectionPages
                | FieldType::PageRef
        )
    }

    /// Whether `switch` consumes the following token as its argument
    pub fn switch_takes_argument(&self, switch: &str) -> bool {
        if matches!(switch, "\\@" | "\\*" | "\\#") {
            return true;
        }
        let letter = switch.trim_start_matches('\\').to_ascii_lowercase();
        match self {
            FieldType::MergeField => matches!(letter.as_str(), "b" | "f"),
            FieldType::Seq => matches!(letter.as_str(), "r" | "s"),
            FieldType::Hyperlink => matches!(letter.as_str(), "l" | "o" | "t"),
            FieldType::Ref | FieldType::PageRef => letter == "d",
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Switch(String),
}

fn tokenize(code: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' if matches!(chars.peek(), Some('"') | Some('\\')) => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    other => text.push(other),
                }
            }
            tokens.push(Token::Quoted(text));
        } else if c == '\\' {
            chars.next();
            let Some(name) = chars.next() else {
                break;
            };
            tokens.push(Token::Switch(format!("\\{}", name)));
            // `\*Upper` and `\@"d"` glue the argument to the switch
            if matches!(name, '*' | '@' | '#') {
                let mut glued = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '"' {
                        break;
                    }
                    glued.push(next);
                    chars.next();
                }
                if !glued.is_empty() {
                    tokens.push(Token::Word(glued));
                }
            }
        } else {
            let mut word = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() || next == '"' || next == '\\' {
                    break;
                }
                word.push(next);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    tokens
}

// =============================================================================
// Parsed field code
// =============================================================================

/// A switch such as `\@ "dd MMMM yyyy"` or `\h`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSwitch {
    /// Switch name including the backslash (e.g. `\@`, `\b`)
    pub name: String,
    pub argument: Option<String>,
}

/// A field code split into its keyword, arguments and switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCode {
    pub field_type: FieldType,
    pub arguments: Vec<String>,
    pub switches: Vec<FieldSwitch>,
    /// The code exactly as parsed
    pub raw: String,
}

impl FieldCode {
    /// Parse a field code string.
    ///
    /// Formula codes (`= 2 + 3 \# "0.0"`) keep the whole expression as their
    /// single argument; every other code is tokenized on whitespace with
    /// double quotes grouping tokens.
    pub fn parse(code: &str) -> Self {
        let trimmed = code.trim();
        if let Some(rest) = trimmed.strip_prefix('=') {
            let split = Self::first_unquoted_backslash(rest).unwrap_or(rest.len());
            let expression = rest[..split].trim().to_string();
            let switches = Self::collect_switches(&FieldType::Formula, tokenize(&rest[split..]), &mut Vec::new());
            return Self {
                field_type: FieldType::Formula,
                arguments: vec![expression],
                switches,
                raw: code.to_string(),
            };
        }

        let mut tokens = tokenize(trimmed);
        let field_type = match tokens.first() {
            Some(Token::Word(keyword)) => {
                let field_type = FieldType::from_keyword(keyword);
                tokens.remove(0);
                field_type
            }
            _ => FieldType::None,
        };
        let mut arguments = Vec::new();
        let switches = Self::collect_switches(&field_type, tokens, &mut arguments);
        Self {
            field_type,
            arguments,
            switches,
            raw: code.to_string(),
        }
    }

    fn first_unquoted_backslash(text: &str) -> Option<usize> {
        let mut in_quotes = false;
        text.char_indices().find_map(|(i, c)| match c {
            '"' => {
                in_quotes = !in_quotes;
                None
            }
            '\\' if !in_quotes => Some(i),
            _ => None,
        })
    }

    fn collect_switches(
        field_type: &FieldType,
        tokens: Vec<Token>,
        arguments: &mut Vec<String>,
    ) -> Vec<FieldSwitch> {
        let mut switches = Vec::new();
        let mut tokens = tokens.into_iter().peekable();
        while let Some(token) = tokens.next() {
            match token {
                Token::Switch(name) => {
                    let argument = if field_type.switch_takes_argument(&name) {
                        match tokens.peek() {
                            Some(Token::Word(_)) | Some(Token::Quoted(_)) => match tokens.next() {
                                Some(Token::Word(text)) | Some(Token::Quoted(text)) => Some(text),
                                _ => None,
                            },
                            _ => None,
                        }
                    } else {
                        None
                    };
                    switches.push(FieldSwitch { name, argument });
                }
                Token::Word(text) | Token::Quoted(text) => arguments.push(text),
            }
        }
        switches
    }

    pub fn argument(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }

    pub fn switch(&self, name: &str) -> Option<&FieldSwitch> {
        self.switches
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn has_switch(&self, name: &str) -> bool {
        self.switch(name).is_some()
    }

    pub fn switch_argument(&self, name: &str) -> Option<&str> {
        self.switch(name).and_then(|s| s.argument.as_deref())
    }

    /// Date picture from `\@`
    pub fn date_format(&self) -> Option<&str> {
        self.switch_argument("\\@")
    }

    /// Numeric picture from `\#`
    pub fn numeric_format(&self) -> Option<&str> {
        self.switch_argument("\\#")
    }

    /// Every general format from `\*` switches, in order
    pub fn general_formats(&self) -> impl Iterator<Item = &str> {
        self.switches
            .iter()
            .filter(|s| s.name == "\\*")
            .filter_map(|s| s.argument.as_deref())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(FieldType::from_keyword("page"), FieldType::Page);
        assert_eq!(FieldType::from_keyword("MergeField"), FieldType::MergeField);
        assert_eq!(
            FieldType::from_keyword("toc"),
            FieldType::Unknown("TOC".to_string())
        );
        assert_eq!(FieldType::NumPages.keyword(), "NUMPAGES");
        assert_eq!(FieldType::Unknown("XE".into()).to_string(), "XE");
    }

    #[test]
    fn test_parse_arguments_and_switches() {
        let code = FieldCode::parse(r#" MERGEFIELD  Name \b "Dear " \f "," \* MERGEFORMAT "#);
        assert_eq!(code.field_type, FieldType::MergeField);
        assert_eq!(code.arguments, vec!["Name"]);
        assert_eq!(code.switch_argument("\\b"), Some("Dear "));
        assert_eq!(code.switch_argument("\\f"), Some(","));
        assert_eq!(code.general_formats().collect::<Vec<_>>(), vec!["MERGEFORMAT"]);
    }

    #[test]
    fn test_flag_switch_does_not_swallow_argument() {
        let code = FieldCode::parse("REF Chapter1 \\h \\p");
        assert_eq!(code.arguments, vec!["Chapter1"]);
        assert!(code.has_switch("\\h"));
        assert!(code.has_switch("\\P"));
        assert_eq!(code.switch_argument("\\h"), None);
    }

    #[test]
    fn test_date_picture_and_glued_switch() {
        let code = FieldCode::parse(r#"DATE \@ "dddd, MMMM d" \*Upper"#);
        assert_eq!(code.date_format(), Some("dddd, MMMM d"));
        assert_eq!(code.general_formats().collect::<Vec<_>>(), vec!["Upper"]);
    }

    #[test]
    fn test_quoted_escapes() {
        let code = FieldCode::parse(r#"QUOTE "say \"hi\" \\ bye""#);
        assert_eq!(code.arguments, vec![r#"say "hi" \ bye"#]);
    }

    #[test]
    fn test_formula_keeps_expression() {
        let code = FieldCode::parse(r#"= SUM(1, 2) * 3 \# "0.00""#);
        assert_eq!(code.field_type, FieldType::Formula);
        assert_eq!(code.arguments, vec!["SUM(1, 2) * 3"]);
        assert_eq!(code.numeric_format(), Some("0.00"));
    }

    #[test]
    fn test_if_operands() {
        let code = FieldCode::parse(r#"IF 3 > 2 "bigger" "smaller""#);
        assert_eq!(code.field_type, FieldType::If);
        assert_eq!(code.arguments, vec!["3", ">", "2", "bigger", "smaller"]);
    }

    #[test]
    fn test_empty_code() {
        let code = FieldCode::parse("   ");
        assert_eq!(code.field_type, FieldType::None);
        assert!(code.arguments.is_empty());
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics_and_keeps_raw(code in "\\PC{0,40}") {
            let parsed = FieldCode::parse(&code);
            prop_assert_eq!(parsed.raw, code);
        }

        #[test]
        fn prop_plain_words_become_arguments(words in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let code = format!("QUOTE {}", words.join(" "));
            let parsed = FieldCode::parse(&code);
            prop_assert_eq!(parsed.arguments, words);
        }
    }
}
