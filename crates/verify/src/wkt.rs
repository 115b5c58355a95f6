//! Permissive parser for bracketed structured-text blocks.
//!
//! Coordinate-reference descriptions arrive as single strings such as
//! `PROJCS["WGS 84 / UTM zone 31N",GEOGCS[...],AUTHORITY["EPSG","32631"]]`.
//! The grammar accepted here is the common core of WKT1 and WKT2:
//!
//! ```text
//! node  := KEYWORD ( '[' | '(' ) [ arg { ',' arg } ] ( ']' | ')' )
//! arg   := node | '"' text '"' | bare
//! ```
//!
//! Quotes inside text are written `""`. The tree is then flattened into the
//! sub-fields the resolver cares about.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::VerifyError;

const MAX_DEPTH: usize = 64;

static STRUCTURED_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*[A-Za-z][A-Za-z0-9_]*\s*[\[(].*[\])]\s*$").expect("valid regex")
});

static UTM_ZONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bzone\s*(\d{1,2})\s*([NS])?\b").expect("valid regex")
});

/// Keywords that wrap another CRS rather than being one.
const WRAPPERS: &[&str] = &["COMPD_CS", "COMPOUNDCRS", "BOUNDCRS", "SOURCECRS"];

const CRS_KEYWORDS: &[&str] = &[
    "PROJCS", "PROJCRS", "PROJECTEDCRS", "GEOGCS", "GEOGCRS", "GEOGRAPHICCRS", "GEOCCS",
    "GEODCRS", "GEODETICCRS", "VERT_CS", "VERTCRS", "LOCAL_CS", "ENGCRS",
];

#[derive(Debug, Clone, PartialEq)]
pub enum WktArg {
    Text(String),
    Bare(String),
    Node(WktNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub args: Vec<WktArg>,
}

impl WktNode {
    /// First quoted argument, conventionally the node's name.
    pub fn name(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            WktArg::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = &WktNode> {
        self.args.iter().filter_map(|a| match a {
            WktArg::Node(n) => Some(n),
            _ => None,
        })
    }

    fn is(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.keyword.eq_ignore_ascii_case(k))
    }

    /// Depth-first search, self included.
    pub fn find(&self, keywords: &[&str]) -> Option<&WktNode> {
        if self.is(keywords) {
            return Some(self);
        }
        self.children().find_map(|c| c.find(keywords))
    }

    fn find_below(&self, keywords: &[&str]) -> Option<&WktNode> {
        self.children().find_map(|c| c.find(keywords))
    }

    fn scalar(&self, index: usize) -> Option<&str> {
        match self.args.get(index)? {
            WktArg::Text(s) | WktArg::Bare(s) => Some(s.as_str()),
            WktArg::Node(_) => None,
        }
    }
}

/// Flattened sub-fields of one structured-text block.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    /// BLAKE3 hex digest of the source text; the cache key.
    pub content_hash: String,
    pub fields: BTreeMap<String, String>,
}

/// Cheap shape test: does this string look like `KEYWORD[ ... ]`?
pub fn looks_structured(text: &str) -> bool {
    text.len() >= 4 && STRUCTURED_SHAPE.is_match(text)
}

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Parse and flatten a block.
pub fn parse_block(text: &str) -> Result<ParsedBlock, VerifyError> {
    let tree = parse_tree(text)?;
    Ok(ParsedBlock {
        content_hash: content_hash(text),
        fields: extract_fields(&tree),
    })
}

pub fn parse_tree(text: &str) -> Result<WktNode, VerifyError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let node = parser.node(0)?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing content after closing bracket"));
    }
    Ok(node)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn error(&self, message: &str) -> VerifyError {
        VerifyError::StructuredText {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn keyword(&mut self) -> Result<String, VerifyError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if start == self.pos || !self.chars[start].is_ascii_alphabetic() {
            self.pos = start;
            return Err(self.error("expected keyword"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn node(&mut self, depth: usize) -> Result<WktNode, VerifyError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let keyword = self.keyword()?;
        self.skip_ws();
        let close = match self.peek() {
            Some('[') => ']',
            Some('(') => ')',
            _ => return Err(self.error("expected '[' or '(' after keyword")),
        };
        self.pos += 1;

        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(WktNode { keyword, args });
        }
        loop {
            args.push(self.arg(depth)?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.error("expected ',' or closing bracket")),
                None => return Err(self.error("unterminated bracket")),
            }
        }
        Ok(WktNode { keyword, args })
    }

    fn arg(&mut self, depth: usize) -> Result<WktArg, VerifyError> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.quoted().map(WktArg::Text),
            Some(c) if c.is_ascii_alphabetic() => {
                // Either a nested node or a bare enum value like `north`
                let save = self.pos;
                let word = self.keyword()?;
                self.skip_ws();
                if matches!(self.peek(), Some('[') | Some('(')) {
                    self.pos = save;
                    self.node(depth + 1).map(WktArg::Node)
                } else {
                    Ok(WktArg::Bare(word))
                }
            }
            Some(_) => self.bare().map(WktArg::Bare),
            None => Err(self.error("unexpected end of text")),
        }
    }

    fn quoted(&mut self) -> Result<String, VerifyError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('"') if self.chars.get(self.pos + 1) == Some(&'"') => {
                    out.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted text")),
            }
        }
    }

    fn bare(&mut self) -> Result<String, VerifyError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if !matches!(c, ',' | '[' | ']' | '(' | ')' | '"')) {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(self.error("empty value"));
        }
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn extract_fields(tree: &WktNode) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    let primary = if tree.is(WRAPPERS) {
        tree.find_below(CRS_KEYWORDS).unwrap_or(tree)
    } else {
        tree
    };

    fields.insert("crs_kind".to_string(), primary.keyword.to_ascii_uppercase());
    if let Some(name) = primary.name() {
        fields.insert("crs_name".to_string(), name.to_string());
    }

    // Identifier: direct child only, never the datum's or ellipsoid's
    let id = primary.children().filter(|c| c.is(&["AUTHORITY", "ID"])).last();
    if let Some(id) = id {
        if let (Some(authority), Some(code)) = (id.scalar(0), id.scalar(1)) {
            fields.insert("authority".to_string(), authority.to_string());
            fields.insert("authority_code".to_string(), code.to_string());
            if authority.eq_ignore_ascii_case("EPSG") {
                fields.insert("epsg_code".to_string(), code.to_string());
            }
        }
    }

    if let Some(name) = primary.find(&["DATUM", "GEODETICDATUM", "TRF"]).and_then(WktNode::name) {
        fields.insert("datum".to_string(), name.to_string());
    }
    if let Some(name) = primary.find(&["SPHEROID", "ELLIPSOID"]).and_then(WktNode::name) {
        fields.insert("spheroid".to_string(), name.to_string());
    }
    let projection = primary
        .find(&["PROJECTION"])
        .or_else(|| primary.find(&["METHOD"]))
        .and_then(WktNode::name);
    if let Some(name) = projection {
        fields.insert("projection".to_string(), name.to_string());
    }

    let units = primary
        .children()
        .filter(|c| c.is(&["UNIT", "LENGTHUNIT", "ANGLEUNIT"]))
        .last()
        .or_else(|| primary.find(&["LENGTHUNIT"]))
        .or_else(|| primary.find(&["UNIT"]))
        .and_then(WktNode::name);
    if let Some(name) = units {
        fields.insert("units".to_string(), name.to_string());
    }

    if let Some(name) = primary.name() {
        if let Some(caps) = UTM_ZONE.captures(name) {
            fields.insert("zone".to_string(), caps[1].to_string());
            if let Some(h) = caps.get(2) {
                fields.insert("hemisphere".to_string(), h.as_str().to_ascii_uppercase());
            }
        }
        if !fields.contains_key("hemisphere") && fields.contains_key("zone") {
            let lower = name.to_lowercase();
            if lower.contains("north") {
                fields.insert("hemisphere".to_string(), "N".to_string());
            } else if lower.contains("south") {
                fields.insert("hemisphere".to_string(), "S".to_string());
            }
        }
    }

    fields
}
