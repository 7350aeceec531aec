// src/models.rs
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::config::ReturnAssumptions;
use crate::services::calculations::{check_return_discrepancy, compute_returns_with, CalcResults};
use crate::services::sensitivity::SensitivityTable;

/// Provenance of a pro forma value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Confirmed,
    Estimated,
    Calculated,
    Missing,
}

impl Label {
    pub const ALL: [Label; 4] = [
        Label::Confirmed,
        Label::Estimated,
        Label::Calculated,
        Label::Missing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Confirmed => "confirmed",
            Label::Estimated => "estimated",
            Label::Calculated => "calculated",
            Label::Missing => "missing",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("invalid label '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value. Numeric strings ("18") convert, anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

/// `{value, unit, label, source}` as produced by the pro forma generator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabeledField {
    #[serde(default)]
    pub value: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl LabeledField {
    pub fn new(value: Option<f64>, unit: &str, label: Label, source: &str) -> Self {
        LabeledField {
            value: value.map(FieldValue::Number),
            unit: Some(unit.to_string()),
            label: Some(label.as_str().to_string()),
            source: Some(source.to_string()),
        }
    }

    /// Parsed provenance label, `None` when absent or not one of the four known labels.
    pub fn provenance(&self) -> Option<Label> {
        self.label.as_deref().and_then(|l| l.parse().ok())
    }

    /// Builds a labeled field from any JSON object. A `value` that is neither a
    /// number nor a string reads as missing; scalar metadata is kept as text.
    fn from_object(map: &Map<String, Value>) -> Self {
        let value = match map.get("value") {
            Some(Value::Number(n)) => n.as_f64().map(FieldValue::Number),
            Some(Value::String(s)) => Some(FieldValue::Text(s.clone())),
            _ => None,
        };
        let meta = |key: &str| match map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        LabeledField {
            value,
            unit: meta("unit"),
            label: meta("label"),
            source: meta("source"),
        }
    }
}

/// One entry of a pro forma section.
///
/// Both shapes the generator emits (a bare number or a labeled object) load
/// transparently. Arrays and booleans are kept as `Other` and read as missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Field {
    Labeled(LabeledField),
    Bare(f64),
    Text(String),
    Null,
    Other(Value),
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Field::Null,
            Value::Number(n) => match n.as_f64() {
                Some(n) => Field::Bare(n),
                None => Field::Other(Value::Number(n)),
            },
            Value::String(s) => Field::Text(s),
            Value::Object(map) => Field::Labeled(LabeledField::from_object(&map)),
            other => Field::Other(other),
        })
    }
}

impl Field {
    pub fn number(&self) -> Option<f64> {
        match self {
            Field::Labeled(field) => field.value.as_ref().and_then(FieldValue::as_f64),
            Field::Bare(n) => Some(*n).filter(|n| n.is_finite()),
            Field::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Field::Null | Field::Other(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s.as_str()),
            Field::Labeled(LabeledField {
                value: Some(FieldValue::Text(s)),
                ..
            }) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_labeled(&self) -> Option<&LabeledField> {
        match self {
            Field::Labeled(field) => Some(field),
            _ => None,
        }
    }

    /// Overwrites the numeric value, keeping unit/label/source of a labeled field.
    pub fn set_number(&mut self, value: f64) {
        match self {
            Field::Labeled(field) => field.value = Some(FieldValue::Number(value)),
            _ => *self = Field::Bare(value),
        }
    }

    /// Multiplies a present, non-zero numeric value in place.
    pub fn scale(&mut self, factor: f64) {
        match self {
            Field::Labeled(field) => {
                let current = field.value.as_ref().and_then(FieldValue::as_f64);
                if let Some(n) = current.filter(|n| *n != 0.0) {
                    field.value = Some(FieldValue::Number(n * factor));
                }
            }
            Field::Bare(n) => *n *= factor,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Section(pub IndexMap<String, Field>);

impl Section {
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, field: Field) -> Option<Field> {
        self.0.insert(key.into(), field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.0.iter()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Field::number)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Field::text)
    }

    /// Sets a numeric value, inserting a bare number when the key is absent.
    pub fn set_number(&mut self, key: &str, value: f64) {
        match self.0.get_mut(key) {
            Some(field) => field.set_number(value),
            None => {
                self.0.insert(key.to_string(), Field::Bare(value));
            }
        }
    }
}

/// Numeric value of `key` in a possibly absent section.
pub fn value(section: Option<&Section>, key: &str) -> Option<f64> {
    section.and_then(|s| s.number(key))
}

/// Like [`value`], substituting `default` when the field or its value is unavailable.
pub fn value_or(section: Option<&Section>, key: &str, default: f64) -> f64 {
    value(section, key).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ProjectSummary,
    RevenueAssumptions,
    CostAssumptions,
    FinancingAssumptions,
    ReturnMetrics,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::ProjectSummary,
        SectionKind::RevenueAssumptions,
        SectionKind::CostAssumptions,
        SectionKind::FinancingAssumptions,
        SectionKind::ReturnMetrics,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SectionKind::ProjectSummary => "project_summary",
            SectionKind::RevenueAssumptions => "revenue_assumptions",
            SectionKind::CostAssumptions => "cost_assumptions",
            SectionKind::FinancingAssumptions => "financing_assumptions",
            SectionKind::ReturnMetrics => "return_metrics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramType {
    Multifamily,
    Condo,
    Office,
    Hotel,
    Other(String),
}

impl ProgramType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "multifamily" => ProgramType::Multifamily,
            "condo" => ProgramType::Condo,
            "office" => ProgramType::Office,
            "hotel" => ProgramType::Hotel,
            other => ProgramType::Other(other.to_string()),
        }
    }

    /// Stabilized occupancy assumed when the model does not state one.
    pub fn default_occupancy_pct(&self) -> f64 {
        match self {
            ProgramType::Office => 88.0,
            ProgramType::Hotel => 70.0,
            _ => 93.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProForma {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_summary: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_assumptions: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_assumptions: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financing_assumptions: Option<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_metrics: Option<Section>,
}

impl ProForma {
    fn slot(&self, kind: SectionKind) -> &Option<Section> {
        match kind {
            SectionKind::ProjectSummary => &self.project_summary,
            SectionKind::RevenueAssumptions => &self.revenue_assumptions,
            SectionKind::CostAssumptions => &self.cost_assumptions,
            SectionKind::FinancingAssumptions => &self.financing_assumptions,
            SectionKind::ReturnMetrics => &self.return_metrics,
        }
    }

    fn slot_mut(&mut self, kind: SectionKind) -> &mut Option<Section> {
        match kind {
            SectionKind::ProjectSummary => &mut self.project_summary,
            SectionKind::RevenueAssumptions => &mut self.revenue_assumptions,
            SectionKind::CostAssumptions => &mut self.cost_assumptions,
            SectionKind::FinancingAssumptions => &mut self.financing_assumptions,
            SectionKind::ReturnMetrics => &mut self.return_metrics,
        }
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.slot(kind).as_ref()
    }

    /// Mutable access to a section, creating an empty one when absent.
    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        self.slot_mut(kind).get_or_insert_with(Section::default)
    }

    pub fn value(&self, kind: SectionKind, key: &str) -> Option<f64> {
        value(self.section(kind), key)
    }

    pub fn field(&self, kind: SectionKind, key: &str) -> Option<&Field> {
        self.section(kind).and_then(|s| s.get(key))
    }

    pub fn summary_text(&self, key: &str) -> Option<&str> {
        self.section(SectionKind::ProjectSummary).and_then(|s| s.text(key))
    }

    pub fn deal_name(&self) -> Option<&str> {
        self.summary_text("deal_name").filter(|name| !name.trim().is_empty())
    }

    /// Program type, `multifamily` when the summary does not name one.
    pub fn program_type(&self) -> ProgramType {
        ProgramType::parse(self.summary_text("program_type").unwrap_or("multifamily"))
    }
}

/// Reads an explicit `null` the same as an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A pro forma together with its cross-checks, i.e. the export payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProFormaModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub pro_forma: ProForma,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityTable>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calc_results: Option<CalcResults>,
}

impl ProFormaModel {
    pub fn from_pro_forma(pro_forma: ProForma, assumptions: &ReturnAssumptions) -> Self {
        let calc = compute_returns_with(&pro_forma, assumptions);
        let warnings = check_return_discrepancy(&pro_forma, &calc);
        ProFormaModel {
            pro_forma,
            sensitivity: None,
            warnings,
            calc_results: Some(calc),
        }
    }

    /// Accepts either an export payload (`{"pro_forma": ...}`) or a bare pro forma.
    /// Missing calculator results are filled in; stated warnings are kept.
    pub fn from_json(
        value: Value,
        assumptions: &ReturnAssumptions,
    ) -> serde_json::Result<Self> {
        if value.get("pro_forma").is_none() {
            let pro_forma: ProForma = serde_json::from_value(value)?;
            return Ok(ProFormaModel::from_pro_forma(pro_forma, assumptions));
        }

        let mut model: ProFormaModel = serde_json::from_value(value)?;
        if model.calc_results.is_none() {
            let calc = compute_returns_with(&model.pro_forma, assumptions);
            if model.warnings.is_empty() {
                model.warnings = check_return_discrepancy(&model.pro_forma, &calc);
            }
            model.calc_results = Some(calc);
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_both_field_shapes() {
        let pf: ProForma = serde_json::from_value(json!({
            "project_summary": {
                "deal_name": "Charlotte MF",
                "unit_count": {
                    "value": 200, "unit": "units", "label": "confirmed", "source": "user-provided"
                },
                "rentable_sf": null,
                "construction_duration_months": "18"
            },
            "cost_assumptions": {
                "total_project_cost": 70000000,
                "hard_cost_psf": {"value": "n/a", "unit": "$/sf", "label": "missing", "source": ""},
                "odd": [1, 2]
            }
        }))
        .unwrap();

        assert_eq!(pf.deal_name(), Some("Charlotte MF"));
        assert_eq!(pf.value(SectionKind::ProjectSummary, "unit_count"), Some(200.0));
        assert_eq!(pf.value(SectionKind::ProjectSummary, "rentable_sf"), None);
        let summary = |key: &str| pf.value(SectionKind::ProjectSummary, key);
        assert_eq!(summary("construction_duration_months"), Some(18.0));
        let total_cost = pf.value(SectionKind::CostAssumptions, "total_project_cost");
        assert_eq!(total_cost, Some(70_000_000.0));
        assert_eq!(pf.value(SectionKind::CostAssumptions, "hard_cost_psf"), None);
        assert_eq!(pf.value(SectionKind::CostAssumptions, "odd"), None);
        assert!(pf.revenue_assumptions.is_none());
        assert_eq!(value_or(pf.section(SectionKind::RevenueAssumptions), "adr", 250.0), 250.0);
    }

    #[test]
    fn labeled_field_keeps_provenance() {
        let field: Field = serde_json::from_value(json!({
            "value": 5.25, "unit": "%", "label": "estimated", "source": "Charlotte cap rate Q4 2025"
        }))
        .unwrap();
        let labeled = field.as_labeled().unwrap();
        assert_eq!(labeled.provenance(), Some(Label::Estimated));
        assert_eq!(field.number(), Some(5.25));

        let bogus = LabeledField { label: Some("guessed".into()), ..Default::default() };
        assert_eq!(bogus.provenance(), None);
    }

    #[test]
    fn arrays_read_as_missing() {
        let pf: ProForma = serde_json::from_value(json!({
            "project_summary": {"unit_count": [200], "is_final": true},
            "revenue_assumptions": {"rent_psf_monthly": 1.85}
        }))
        .unwrap();

        let unit_count = pf.field(SectionKind::ProjectSummary, "unit_count").unwrap();
        assert_eq!(unit_count, &Field::Other(json!([200])));
        assert_eq!(pf.value(SectionKind::ProjectSummary, "unit_count"), None);
        assert_eq!(pf.value(SectionKind::ProjectSummary, "is_final"), None);
        let calc = compute_returns_with(&pf, &ReturnAssumptions::default());
        assert_eq!(calc.calc_noi, None);
    }

    #[test]
    fn labeled_field_tolerates_odd_metadata() {
        let pf: ProForma = serde_json::from_value(json!({
            "project_summary": {
                "unit_count": {"value": 200, "unit": 1, "label": null, "source": ["broker"]}
            },
            "revenue_assumptions": {"rent_psf_monthly": 1.85}
        }))
        .unwrap();

        let labeled = pf
            .field(SectionKind::ProjectSummary, "unit_count")
            .and_then(Field::as_labeled)
            .unwrap();
        assert_eq!(labeled.value, Some(FieldValue::Number(200.0)));
        assert_eq!(labeled.unit.as_deref(), Some("1"));
        assert_eq!(labeled.label, None);
        assert_eq!(labeled.source.as_deref(), Some("[\"broker\"]"));

        let calc = compute_returns_with(&pf, &ReturnAssumptions::default());
        assert!((calc.calc_noi.unwrap() - 2_596_932.0).abs() < 1e-3);
    }

    #[test]
    fn set_number_and_scale_respect_shape() {
        let mut labeled =
            Field::Labeled(LabeledField::new(Some(300.0), "$/sf", Label::Estimated, "broker"));
        labeled.scale(1.1);
        assert!((labeled.number().unwrap() - 330.0).abs() < 1e-9);
        labeled.set_number(5.0);
        assert_eq!(labeled.as_labeled().unwrap().unit.as_deref(), Some("$/sf"));

        let mut bare = Field::Bare(10.0);
        bare.scale(0.9);
        assert_eq!(bare.number(), Some(9.0));

        let mut missing = Field::Labeled(LabeledField::new(None, "$", Label::Missing, ""));
        missing.scale(1.1);
        assert_eq!(missing.number(), None);
    }

    #[test]
    fn program_type_defaults_to_multifamily() {
        assert_eq!(ProForma::default().program_type(), ProgramType::Multifamily);
        assert_eq!(ProgramType::parse(" Hotel "), ProgramType::Hotel);
        assert_eq!(ProgramType::parse("retail"), ProgramType::Other("retail".into()));
    }

    #[test]
    fn model_from_either_json_shape() {
        let assumptions = ReturnAssumptions::default();
        let bare = json!({"return_metrics": {"stabilized_noi": 4000000}});
        let model = ProFormaModel::from_json(bare, &assumptions).unwrap();
        assert_eq!(model.calc_results.as_ref().unwrap().calc_noi, Some(4_000_000.0));

        let payload = json!({
            "pro_forma": {"return_metrics": {"stabilized_noi": 1000}},
            "warnings": ["stated"]
        });
        let model = ProFormaModel::from_json(payload, &assumptions).unwrap();
        assert_eq!(model.warnings, vec!["stated"]);
        assert_eq!(model.calc_results.unwrap().calc_noi, Some(1000.0));
    }

    #[test]
    fn null_payload_parts_read_as_absent() {
        let payload = json!({
            "pro_forma": null,
            "warnings": null,
            "sensitivity": {"values": [[10, 11, 12]]}
        });
        let model = ProFormaModel::from_json(payload, &ReturnAssumptions::default()).unwrap();
        assert_eq!(model.pro_forma, ProForma::default());
        assert!(model.warnings.is_empty());
        let table = model.sensitivity.unwrap();
        assert_eq!(table.cols, vec!["-10%", "Base", "+10%"]);
        assert_eq!(table.value_at(0, 2), Some(12.0));
        assert_eq!(table.base_position, [1, 1]);
    }
}
