//! Dropdown discovery and role classification.
//!
//! The assessor form carries no stable identifiers, so controls are
//! enumerated from the live DOM and classified by an ordered rule table:
//! keyword rules first, positional convention as the explicit final rule.
//! The precedence is a single inspectable list rather than branching code.

use crate::error::LookupError;
use crate::renderer::RenderContext;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;

/// JavaScript that enumerates every `<select>` on the page with a
/// re-queryable selector, its identifying attributes, and its current
/// option set.
const ENUMERATE_SELECTS_JS: &str = r#"
(() => {
    const out = [];
    document.querySelectorAll('select').forEach((el, i) => {
        let selector;
        if (el.id) {
            selector = '#' + CSS.escape(el.id);
        } else if (el.name) {
            selector = 'select[name=' + JSON.stringify(el.name) + ']';
        } else {
            selector = 'select:nth-of-type(' + (i + 1) + ')';
        }
        out.push({
            selector,
            id: el.id || '',
            name: el.name || '',
            position: i,
            options: Array.from(el.options).map(o => [o.value, o.text]),
        });
    });
    return out;
})()
"#;

/// A `<select>` control observed on the live page.
///
/// Instances are ephemeral: option sets change asynchronously after each
/// upstream selection, so the driver re-reads options by `selector`
/// instead of trusting this snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectControl {
    /// CSS selector that re-locates this control.
    pub selector: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Zero-based position among the page's selects, in document order.
    pub position: usize,
    /// Ordered (value, label) pairs at enumeration time.
    pub options: Vec<(String, String)>,
}

/// The semantic role a control plays in the cascade, independent of its
/// literal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRole {
    Region,
    Street,
    AddressNumber,
}

impl fmt::Display for ControlRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Region => "region",
            Self::Street => "street",
            Self::AddressNumber => "address-number",
        })
    }
}

/// The three classified controls, in dependency order.
#[derive(Debug, Clone)]
pub struct ResolvedControls {
    pub region: SelectControl,
    pub street: SelectControl,
    pub address: SelectControl,
}

/// One keyword rule of the classification table. Rules are evaluated in
/// order; each claims the first still-unclaimed control whose id or name
/// contains one of its keywords.
struct RoleRule {
    role: ControlRole,
    keywords: &'static [&'static str],
}

const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        role: ControlRole::Region,
        keywords: &["region", "city", "town"],
    },
    RoleRule {
        role: ControlRole::Street,
        keywords: &["street"],
    },
    RoleRule {
        role: ControlRole::AddressNumber,
        keywords: &["address", "number"],
    },
];

/// Enumerate every select control currently on the page.
pub async fn enumerate_selects(ctx: &dyn RenderContext) -> Result<Vec<SelectControl>> {
    let value = ctx.execute_js(ENUMERATE_SELECTS_JS).await?;
    let controls: Vec<SelectControl> =
        serde_json::from_value(value).context("malformed select enumeration payload")?;
    Ok(controls)
}

/// Classify the region / street / address-number roles.
///
/// Keyword rules run first; any role still unassigned afterwards falls
/// back to positional convention (first control is region, second is
/// street, third is address-number), standing in the next unclaimed
/// control when the conventional slot was already taken by a keyword.
/// This tolerates markup changes that preserve either naming or ordering
/// but not both.
pub fn resolve_roles(controls: &[SelectControl]) -> Result<ResolvedControls, LookupError> {
    if controls.len() < 3 {
        return Err(LookupError::Resolution {
            found: controls.len(),
        });
    }

    let mut assigned: [Option<usize>; 3] = [None; 3];
    let mut claimed = vec![false; controls.len()];

    for (slot, rule) in ROLE_RULES.iter().enumerate() {
        for (i, control) in controls.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let haystack = format!("{} {}", control.id, control.name).to_lowercase();
            if rule.keywords.iter().any(|kw| haystack.contains(kw)) {
                assigned[slot] = Some(i);
                claimed[i] = true;
                break;
            }
        }
    }

    // Final rule: positional convention.
    for (slot, assignment) in assigned.iter_mut().enumerate() {
        if assignment.is_some() {
            continue;
        }
        let index = if !claimed[slot] {
            slot
        } else {
            claimed
                .iter()
                .position(|c| !c)
                .expect("three roles over at least three controls always leaves a slot")
        };
        *assignment = Some(index);
        claimed[index] = true;
    }

    Ok(ResolvedControls {
        region: controls[assigned[0].unwrap_or(0)].clone(),
        street: controls[assigned[1].unwrap_or(1)].clone(),
        address: controls[assigned[2].unwrap_or(2)].clone(),
    })
}
