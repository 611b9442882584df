//! Best-effort extraction of a property record from the response page.
//!
//! The source markup has no fixed schema, so extraction walks every table
//! cell against an ordered table of label-keyed rules, using the
//! enclosing row's text as a secondary source, then runs three page-wide
//! regex fallbacks for the fields most likely to appear outside tabular
//! markup. Missing fields are expected and never an error.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Structured assessor record. Every field is independently optional;
/// unset fields are omitted from serialized output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sale_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sale_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Owner,
    OwnerAddress,
    BuildingValue,
    LandValue,
    OtherValue,
    TotalValue,
    AssessmentYear,
    LotSize,
    LastSalePrice,
    LastSaleDate,
    UseCode,
    YearBuilt,
}

impl PropertyRecord {
    fn get(&self, field: Field) -> &Option<String> {
        match field {
            Field::Owner => &self.owner,
            Field::OwnerAddress => &self.owner_address,
            Field::BuildingValue => &self.building_value,
            Field::LandValue => &self.land_value,
            Field::OtherValue => &self.other_value,
            Field::TotalValue => &self.total_value,
            Field::AssessmentYear => &self.assessment_year,
            Field::LotSize => &self.lot_size,
            Field::LastSalePrice => &self.last_sale_price,
            Field::LastSaleDate => &self.last_sale_date,
            Field::UseCode => &self.use_code,
            Field::YearBuilt => &self.year_built,
        }
    }

    /// A field populated by a specific rule is never overwritten by a
    /// weaker rule for the same field.
    fn set_if_empty(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Owner => &mut self.owner,
            Field::OwnerAddress => &mut self.owner_address,
            Field::BuildingValue => &mut self.building_value,
            Field::LandValue => &mut self.land_value,
            Field::OtherValue => &mut self.other_value,
            Field::TotalValue => &mut self.total_value,
            Field::AssessmentYear => &mut self.assessment_year,
            Field::LotSize => &mut self.lot_size,
            Field::LastSalePrice => &mut self.last_sale_price,
            Field::LastSaleDate => &mut self.last_sale_date,
            Field::UseCode => &mut self.use_code,
            Field::YearBuilt => &mut self.year_built,
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }
}

/// One extraction rule: a label pattern that identifies the cell, and a
/// value-shape pattern applied to the text after the label.
struct ExtractRule {
    field: Field,
    label: Regex,
    value: Regex,
    /// Free-text captures get truncated at the next recognized label.
    free_text: bool,
}

/// Currency amounts: `$` plus digit/comma runs, optional cents.
const CURRENCY: &str = r"(\$[\d,]*\d(?:\.\d{2})?)";
/// Four-digit years.
const YEAR: &str = r"((?:18|19|20)\d{2})";

fn rule(field: Field, label: &str, value: &str, free_text: bool) -> ExtractRule {
    ExtractRule {
        field,
        label: Regex::new(label).expect("label pattern is valid"),
        value: Regex::new(value).expect("value pattern is valid"),
        free_text,
    }
}

/// The twelve label-keyed rules, in evaluation order.
fn extraction_rules() -> Vec<ExtractRule> {
    vec![
        rule(Field::Owner, r"(?i)\bowner\s*:", r"([^\r\n:]{2,120})", true),
        rule(
            Field::OwnerAddress,
            r"(?i)\bowner\s+address\s*:",
            // Multi-cell field; the value pattern only covers the inline case.
            r"([^\r\n:]{2,200})",
            true,
        ),
        rule(Field::BuildingValue, r"(?i)\bbuilding\s+value\s*:", CURRENCY, false),
        rule(Field::LandValue, r"(?i)\bland\s+value\s*:", CURRENCY, false),
        rule(Field::OtherValue, r"(?i)\bother\s+value\s*:", CURRENCY, false),
        rule(Field::TotalValue, r"(?i)\btotal\s+value\s*:", CURRENCY, false),
        rule(
            Field::AssessmentYear,
            r"(?i)\b(?:fiscal\s+year|assessment\s+year|fy)",
            YEAR,
            false,
        ),
        rule(
            Field::LotSize,
            r"(?i)\blot\s+size\s*:",
            r"(?i)((?:\d+\.)?\d+\s*acres)",
            false,
        ),
        rule(
            Field::LastSalePrice,
            r"(?i)\blast\s+sale\s+price\s*:",
            CURRENCY,
            false,
        ),
        rule(
            Field::LastSaleDate,
            r"(?i)\blast\s+sale\s+date\s*:",
            r"(\d{8})",
            false,
        ),
        rule(Field::UseCode, r"(?i)\buse\s+code\s*:", r"([^\r\n:]{1,60})", true),
        rule(Field::YearBuilt, r"(?i)\byear\s+built\s*:", YEAR, false),
    ]
}

/// Page-wide fallback patterns for the fields most likely to appear
/// outside tabular markup. Applied only where the table scan found nothing.
fn fallback_rules() -> Vec<(Field, Regex)> {
    let re = |pattern: &str| Regex::new(pattern).expect("fallback pattern is valid");
    vec![
        (Field::YearBuilt, re(r"(?i)year\s+built\W{0,3}((?:18|19|20)\d{2})")),
        (Field::TotalValue, re(r"(?i)total(?:\s+value)?\W{0,3}(\$[\d,]+(?:\.\d{2})?)")),
        (Field::LotSize, re(r"(?i)((?:\d+\.)?\d+\s*acres)")),
    ]
}

/// Extract a record from the response page's markup. Never fails; absent
/// fields simply remain unset.
pub fn extract_record(html: &str) -> PropertyRecord {
    let document = Html::parse_document(html);
    let rules = extraction_rules();
    let mut record = PropertyRecord::default();

    let row_sel = Selector::parse("tr").expect("row selector is valid");
    let cell_sel = Selector::parse("td, th").expect("cell selector is valid");

    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        let row_text = element_text(&row);

        for (i, cell) in cells.iter().enumerate() {
            let cell_text = element_text(cell);
            for rule in &rules {
                if record.get(rule.field).is_some() || !rule.label.is_match(&cell_text) {
                    continue;
                }

                if rule.field == Field::OwnerAddress {
                    if let Some(joined) = collect_owner_address(&cells[i + 1..]) {
                        record.set_if_empty(Field::OwnerAddress, joined);
                        continue;
                    }
                }

                // The cell itself first, the enclosing row as a secondary source.
                let found = value_after_label(rule, &cell_text, &rules)
                    .or_else(|| value_after_label(rule, &row_text, &rules));
                if let Some(value) = found {
                    record.set_if_empty(rule.field, value);
                }
            }
        }
    }

    let body = body_text(&document);
    for (field, pattern) in fallback_rules() {
        if record.get(field).is_some() {
            continue;
        }
        if let Some(captures) = pattern.captures(&body) {
            if let Some(group) = captures.get(1) {
                record.set_if_empty(field, group.as_str().trim().to_string());
            }
        }
    }

    record
}

/// Apply a rule's value pattern to the text following its label match.
fn value_after_label(rule: &ExtractRule, text: &str, all_rules: &[ExtractRule]) -> Option<String> {
    let label_match = rule.label.find(text)?;
    let remainder = &text[label_match.end()..];
    let captured = rule.value.captures(remainder)?.get(1)?.as_str();
    let mut value = captured.trim().to_string();
    if rule.free_text {
        value = truncate_at_next_label(&value, all_rules);
    }
    (!value.is_empty()).then_some(value)
}

/// Cut a free-text capture at the earliest occurrence of any other
/// recognized label, so row-level text does not bleed neighboring fields
/// into the value.
fn truncate_at_next_label(value: &str, rules: &[ExtractRule]) -> String {
    let mut cut = value.len();
    for rule in rules {
        // Free-text captures exclude ':', so each label is matched with
        // its trailing ':' requirement stripped.
        let stripped = rule.label.as_str().trim_end_matches(r"\s*:");
        if let Ok(prefix) = Regex::new(stripped) {
            if let Some(m) = prefix.find(value) {
                cut = cut.min(m.start());
            }
        }
    }
    value[..cut].trim().to_string()
}

/// Owner address spans several cells: collect following sibling cells'
/// text until one containing "Building Value", joined with ", ".
fn collect_owner_address(following: &[ElementRef<'_>]) -> Option<String> {
    let mut parts = Vec::new();
    for cell in following {
        let text = element_text(cell);
        if text.to_lowercase().contains("building value") {
            break;
        }
        if !text.is_empty() {
            parts.push(text);
        }
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Collect visible text content from an element, whitespace-collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// All text content of the `<body>` element.
fn body_text(document: &Html) -> String {
    if let Ok(sel) = Selector::parse("body") {
        if let Some(body) = document.select(&sel).next() {
            return element_text(&body);
        }
    }
    String::new()
}
