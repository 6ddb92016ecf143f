//! Human-readable explanations for factor results.

mod template;

pub use template::{
    Binding, Bindings, ContributorField, ExplanationTemplate, Slot, TemplateError, Variable,
    UNAVAILABLE,
};

use super::factor::{FactorResult, ScoreComponent};
use super::round_to;

/// Used for factor definitions that do not declare their own explanation.
pub const DEFAULT_FACTOR_TEMPLATE: &str = "\
{if score}
{factor}: {score}/100 - {assessment}
{if top_score >= 60}

Key strengths:
  - {top_label}: {top_value} (score: {top_score})
{if second_score >= 60}
  - {second_label}: {second_value} (score: {second_score})
{endif}
{endif}
{if bottom_score < 40}

Areas of concern:
{if lower_score < 40}
  - {lower_label}: {lower_value} (score: {lower_score})
{endif}
  - {bottom_label}: {bottom_value} (score: {bottom_score})
{endif}
{else}
{factor}: Insufficient data to calculate score.
{endif}
";

/// Render `template` against a computed factor result. Trailing whitespace is
/// dropped so conditional sections never leave dangling blank lines.
pub fn render(template: &ExplanationTemplate, result: &FactorResult) -> String {
    let context = ExplanationContext::new(result);
    let mut rendered = template.render(&context);
    rendered.truncate(rendered.trim_end().len());
    rendered
}

pub fn assessment(score: f64) -> &'static str {
    if score >= 80.0 {
        "Excellent"
    } else if score >= 65.0 {
        "Strong"
    } else if score >= 50.0 {
        "Moderate"
    } else if score >= 35.0 {
        "Below average"
    } else {
        "Weak"
    }
}

/// Variable bindings for one factor result, with present components ranked by
/// contribution (highest first, declaration order on ties).
pub struct ExplanationContext<'a> {
    result: &'a FactorResult,
    ranked: Vec<&'a ScoreComponent>,
}

impl<'a> ExplanationContext<'a> {
    pub fn new(result: &'a FactorResult) -> Self {
        let mut ranked: Vec<&ScoreComponent> = result
            .components
            .iter()
            .filter(|component| component.contribution.is_some())
            .collect();
        ranked.sort_by(|left, right| {
            let left = left.contribution.unwrap_or(0.0);
            let right = right.contribution.unwrap_or(0.0);
            right.total_cmp(&left)
        });

        Self { result, ranked }
    }

    pub fn contributor(&self, slot: Slot) -> Option<&'a ScoreComponent> {
        match slot {
            Slot::Top => self.ranked.first().copied(),
            Slot::Second => self.ranked.get(1).copied(),
            Slot::Lower => self
                .ranked
                .len()
                .checked_sub(2)
                .and_then(|index| self.ranked.get(index))
                .copied(),
            Slot::Bottom => self.ranked.last().copied(),
        }
    }
}

impl Bindings for ExplanationContext<'_> {
    fn lookup(&self, variable: Variable) -> Option<Binding> {
        match variable {
            Variable::Factor => Some(Binding::text(self.result.label.as_str())),
            Variable::FactorId => Some(Binding::text(self.result.factor.as_str())),
            Variable::Score => self.result.score.map(one_decimal),
            Variable::Assessment => self
                .result
                .score
                .map(|score| Binding::text(assessment(round_to(score, 1)))),
            Variable::MetricsAvailable => Some(count(self.ranked.len())),
            Variable::MetricsTotal => Some(count(self.result.components.len())),
            Variable::Contributor(slot, field) => {
                let component = self.contributor(slot)?;
                match field {
                    ContributorField::Label => Some(Binding::text(component.label.as_str())),
                    ContributorField::Value => component
                        .raw_value
                        .map(|raw| Binding::number(component.value_kind.format(raw), raw)),
                    ContributorField::Score => component.score.map(one_decimal),
                    ContributorField::Weight => {
                        let percent = component.weight * 100.0;
                        Some(Binding::number(format!("{percent:.0}%"), percent))
                    }
                }
            }
        }
    }
}

fn one_decimal(value: f64) -> Binding {
    let rounded = round_to(value, 1);
    Binding::number(format!("{rounded:.1}"), rounded)
}

fn count(value: usize) -> Binding {
    Binding::number(value.to_string(), value as f64)
}
