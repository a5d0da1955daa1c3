//! Text-role classification and re-layout.
//!
//! Templates ship with placeholder copy ("Mina Desai", "Manager",
//! "9876543210"). Each visible `<text>` element is classified into a semantic
//! role and rebuilt as plain SVG text (`<text>` + one `<tspan>` per line) with
//! the role as its `id`, so downstream editors can fill fields by name.
//!
//! ## Classification order (first match wins)
//!
//! 1. self-name allow-list      → `selfName`
//! 2. company allow-list        → `companyName`
//! 3. URL-like text             → `website`
//! 4. job-title allow-list      → `designation`
//! 5. Indian phone number(s)    → `selfPhone`
//! 6. recipient allow-list      → `toName` (text kept as is)
//! 7. anything else             → `editableText` (text kept as is)
//!
//! Decorative titles (`Dg_type="DgTitle"`) are removed outright. Text placed
//! at a negative or missing position is hidden in the editor and left alone.

use crate::error::SyncError;
use crate::pipeline::layers::{attr, parse_markup};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:https?://)?(?:www\.)?[^\s]+\.[^\s]+").unwrap());

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\+91)?(?:\d{10})(?:\s*/\s*\d{10})?$").unwrap());

const DEFAULT_FONT_FAMILY: &str = "sans-serif";
const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_FILL: &str = "000000";
const TITLE_TYPE: &str = "DgTitle";

/// Line-break reference as written in the `Text` attribute.
const LINE_BREAK_REF: &str = "&#10;";

/// Semantic identity of a text field; rendered as the element `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextRole {
    SelfName,
    CompanyName,
    Website,
    Designation,
    SelfPhone,
    ToName,
    EditableText,
}

impl TextRole {
    pub fn id(self) -> &'static str {
        match self {
            TextRole::SelfName => "selfName",
            TextRole::CompanyName => "companyName",
            TextRole::Website => "website",
            TextRole::Designation => "designation",
            TextRole::SelfPhone => "selfPhone",
            TextRole::ToName => "toName",
            TextRole::EditableText => "editableText",
        }
    }

    /// Roles whose text is laid out centred (unless the last line is a
    /// hyphenated signature line).
    fn may_center(self) -> bool {
        matches!(self, TextRole::ToName | TextRole::EditableText)
    }
}

impl fmt::Display for TextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Result of classifying one text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub role: TextRole,
    pub text: String,
}

/// Reference sets and replacement values for role classification.
#[derive(Debug, Clone)]
pub struct TextRoles {
    pub self_names: Vec<String>,
    pub self_name_replacement: String,
    pub company_names: Vec<String>,
    pub company_replacement: String,
    pub website_pattern: Regex,
    pub website_replacement: String,
    pub designations: Vec<String>,
    pub designation_replacement: String,
    pub phone_pattern: Regex,
    pub phone_replacement: String,
    pub recipient_names: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for TextRoles {
    fn default() -> Self {
        Self {
            self_names: strings(&["Leena Khanolkar", "Mina Dalal", "Mina Desai", "Mansi Desai"]),
            self_name_replacement: "Khan Afzal".into(),
            company_names: strings(&["DgFlick Insurance", "Instrasoft Solutions"]),
            company_replacement: "Datacomp Web Technologies Pvt. Ltd.".into(),
            website_pattern: URL_PATTERN.clone(),
            website_replacement: "www.webmail.datacomp.in".into(),
            designations: strings(&[
                "Chief Operating Officer",
                "Chief Marketing Officer",
                "Chief Maketing Officer",
                "Chief marketing Manager",
                "Chief Marketing Manager",
                "Manager",
            ]),
            designation_replacement: "Software Developer".into(),
            phone_pattern: PHONE_PATTERN.clone(),
            phone_replacement: "8692979117".into(),
            recipient_names: strings(&["Rohit Jahagirdar"]),
        }
    }
}

impl TextRoles {
    /// Classify a raw text value. Deterministic for a given input and set.
    pub fn classify(&self, text: &str) -> Classified {
        let hit = |set: &[String]| set.iter().any(|s| s == text);
        let (role, replacement) = if hit(&self.self_names) {
            (TextRole::SelfName, self.self_name_replacement.clone())
        } else if hit(&self.company_names) {
            (TextRole::CompanyName, self.company_replacement.clone())
        } else if self.website_pattern.is_match(text) {
            (TextRole::Website, self.website_replacement.clone())
        } else if hit(&self.designations) {
            (TextRole::Designation, self.designation_replacement.clone())
        } else if self.phone_pattern.is_match(text) {
            (TextRole::SelfPhone, self.phone_replacement.clone())
        } else if hit(&self.recipient_names) {
            (TextRole::ToName, text.to_string())
        } else {
            (TextRole::EditableText, text.to_string())
        };
        Classified {
            role,
            text: replacement,
        }
    }
}

/// Attributes of a visible design text element.
#[derive(Debug, Clone, PartialEq)]
pub struct TextField {
    pub x: String,
    pub y: String,
    pub width: String,
    pub height: String,
    /// `Text` attribute; lines are separated by `\n` (`&#10;` in the markup).
    pub content: String,
    pub family: Option<String>,
    pub point_size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    /// Hex colour without the leading `#`.
    pub color: Option<String>,
}

fn non_negative(value: Option<&str>) -> Option<&str> {
    let v = value?.trim();
    match v.parse::<f64>() {
        Ok(n) if n >= 0.0 && n.is_finite() => Some(v),
        _ => None,
    }
}

impl TextField {
    /// Read a `<text>` element; `None` when it is not placed at a
    /// non-negative position.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Option<Self> {
        let x = non_negative(attr(node, "x"))?;
        let y = non_negative(attr(node, "y"))?;
        let dim = |name: &str| non_negative(attr(node, name)).unwrap_or("0").to_string();

        Some(TextField {
            x: x.to_string(),
            y: y.to_string(),
            width: dim("width"),
            height: dim("height"),
            content: attr(node, "Text").unwrap_or_default().to_string(),
            family: attr(node, "DgTitleFamily")
                .filter(|f| !f.trim().is_empty())
                .map(str::to_string),
            point_size: attr(node, "DgTitlePointSize")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|s| *s > 0.0),
            bold: attr(node, "DgTitleBold") == Some("1"),
            italic: attr(node, "DgTitleItalic") == Some("1"),
            color: attr(node, "DgTitleColor")
                .map(|c| c.trim().trim_start_matches('#').to_string())
                .filter(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_hexdigit())),
        })
    }

    /// Rebuild as SVG text with the classified role and one tspan per line.
    pub fn render(&self, roles: &TextRoles) -> String {
        // Classified in its markup form, line breaks still encoded.
        let classified = roles.classify(&self.content.replace('\n', LINE_BREAK_REF));
        let mut lines: Vec<&str> = self.content.split('\n').collect();
        if lines.len() == 1 {
            lines[0] = &classified.text;
        }

        let height: f64 = self.height.parse().unwrap_or(0.0);
        let line_height = height / lines.len() as f64;
        let last_has_dash = lines.last().is_some_and(|l| l.contains('-'));
        let centered = classified.role.may_center() && !last_has_dash;

        let mut out = String::new();
        let _ = write!(
            out,
            r##"<text id="{}" x="{}" y="{}" width="{}" height="{}" font-family="{}" font-size="{}" font-weight="{}" font-style="{}" fill="#{}""##,
            classified.role.id(),
            escape_xml(&self.x),
            escape_xml(&self.y),
            escape_xml(&self.width),
            escape_xml(&self.height),
            escape_xml(self.family.as_deref().unwrap_or(DEFAULT_FONT_FAMILY)),
            self.point_size.unwrap_or(DEFAULT_FONT_SIZE),
            if self.bold { "bold" } else { "normal" },
            if self.italic { "italic" } else { "normal" },
            self.color.as_deref().unwrap_or(DEFAULT_FILL),
        );
        if centered {
            out.push_str(r#" text-anchor="middle""#);
        }
        out.push('>');

        let line_x = if centered { "50%" } else { self.x.as_str() };
        for (index, line) in lines.iter().enumerate() {
            let dy = if index == 0 { line_height + 1.0 } else { line_height };
            let _ = write!(
                out,
                r#"<tspan x="{}" dy="{}">{}</tspan>"#,
                escape_xml(line_x),
                dy,
                escape_xml(line)
            );
        }
        out.push_str("</text>");
        out
    }
}

/// Escape text for use in XML content or a double-quoted attribute.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Drop decorative titles and rebuild every visible text field.
pub fn relayout_text(markup: &str, roles: &TextRoles, path: &Path) -> Result<String, SyncError> {
    let doc = parse_markup(markup, path)?;

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut removed = 0usize;
    for node in doc.descendants().filter(|n| is_top_level_text(*n)) {
        if attr(node, "Dg_type") == Some(TITLE_TYPE) {
            edits.push((node.range(), String::new()));
            removed += 1;
        } else if let Some(field) = TextField::from_node(node) {
            edits.push((node.range(), field.render(roles)));
        }
    }
    debug!(
        "Text relayout: {} fields rebuilt, {} titles removed",
        edits.len() - removed,
        removed
    );

    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(markup.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&markup[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&markup[cursor..]);
    Ok(out)
}

/// A `<text>` element that is not nested in another `<text>`.
pub(crate) fn is_top_level_text(node: roxmltree::Node<'_, '_>) -> bool {
    node.is_element()
        && node.tag_name().name() == "text"
        && !node
            .ancestors()
            .skip(1)
            .any(|a| a.is_element() && a.tag_name().name() == "text")
}
