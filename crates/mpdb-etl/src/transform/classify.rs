//! Line item kind classification.
//!
//! Rules are evaluated in order and the first match wins. Fee wording is
//! checked before bonus wording, so "Management Fee - Bonus" is a fee.

use mpdb_core::LineItemKind;
use regex::Regex;
use rust_decimal::Decimal;

const FEE_PATTERN: &str = r"(?i)\b(management|mgmt|fees?|commission)\b";
const BONUS_PATTERN: &str =
    r"(?i)\b(bonus|added[\s_-]?value|free|make[\s_-]?goods?|no[\s_-]?charge|comp(?:ed|limentary)?)\b";
const ZERO_MARGIN_PATTERN: &str = r"(?i)\b(zero|no|0%?)[\s_-]?margin\b";

/// Fields the rules look at.
#[derive(Debug, Clone, Default)]
pub struct ClassifierInput<'a> {
    pub name: &'a str,
    /// Explicit type label from the source, e.g. `"Mgmt Fee"`.
    pub type_hint: Option<&'a str>,
    pub unit_type: Option<&'a str>,
    pub unit_price: Decimal,
    /// `None` when the row carries no margin field.
    pub target_margin: Option<Decimal>,
}

impl ClassifierInput<'_> {
    fn text(&self) -> String {
        [Some(self.name), self.type_hint, self.unit_type]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct LineItemClassifier {
    fee: Regex,
    bonus: Regex,
    zero_margin: Regex,
}

impl LineItemClassifier {
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a rule pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fee: Regex::new(FEE_PATTERN)?,
            bonus: Regex::new(BONUS_PATTERN)?,
            zero_margin: Regex::new(ZERO_MARGIN_PATTERN)?,
        })
    }

    #[must_use]
    pub fn classify(&self, input: &ClassifierInput<'_>) -> LineItemKind {
        let text = input.text();
        if self.fee.is_match(&text) {
            return LineItemKind::ManagementFee;
        }
        if input.unit_price.is_zero() && self.bonus.is_match(&text) {
            return LineItemKind::ZeroDollar;
        }
        if input.target_margin.is_some_and(|m| m.is_zero()) || self.zero_margin.is_match(&text) {
            return LineItemKind::ZeroMargin;
        }
        LineItemKind::Standard
    }
}
