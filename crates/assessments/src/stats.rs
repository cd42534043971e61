//! Completion, answer-type breakdown and per-sub-department risk metrics.
//!
//! Everything here is a pure function of the answer facts loaded for an
//! assessment (or every assessment of a company). Percentages are rounded to
//! two decimals and a zero denominator yields `0.0`.

use std::collections::BTreeMap;

use serde::Serialize;

use assurance_core::SubDepartmentId;

use crate::answer::AnswerText;
use crate::question::{ControlNumber, RiskRating};

/// Damping applied to the gap rate for `departmentRiskIndex`.
pub const RISK_DAMPING: f64 = 0.9;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / total * 100`, rounded to two decimals; `0.0` when `total` is zero.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

impl RiskRating {
    /// Weight used by the weighted risk index.
    pub fn weight(&self) -> f64 {
        match self {
            RiskRating::Critical => 1.0,
            RiskRating::High => 0.75,
            RiskRating::Medium => 0.5,
            RiskRating::Low => 0.25,
        }
    }
}

/// One live answer, flattened with what the engine needs from its question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFact {
    pub sub_department_id: SubDepartmentId,
    pub answer_text: AnswerText,
    pub control_numbers: Vec<ControlNumber>,
    pub risk_rating: Option<RiskRating>,
}

/// Question counts per sub-department plus the live answers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsInput {
    pub question_counts: BTreeMap<SubDepartmentId, u64>,
    pub answers: Vec<AnswerFact>,
}

impl StatisticsInput {
    /// Fold another assessment's facts in (company-level statistics).
    pub fn merge(&mut self, other: StatisticsInput) {
        for (sub, count) in other.question_counts {
            *self.question_counts.entry(sub).or_default() += count;
        }
        self.answers.extend(other.answers);
    }

    pub fn total_questions(&self) -> u64 {
        self.question_counts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerTypeBreakdown {
    pub answer_text: AnswerText,
    pub count: u64,
    pub percentage: f64,
    /// Summed per control family (text before the first `-`).
    pub by_control_prefix: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubDepartmentRisk {
    pub sub_department_id: SubDepartmentId,
    pub total_questions: u64,
    pub implemented_count: u64,
    pub gap_count: u64,
    pub control_coverage_ratio: f64,
    pub gap_density_rate: f64,
    pub department_risk_index: f64,
    /// `None` when no answered question in the sub-department carries a
    /// risk rating.
    pub weighted_risk_index: Option<f64>,
    pub documentation_coverage_ratio: f64,
    pub department_compliance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_questions: u64,
    pub total_answers: u64,
    pub percentage_completed: f64,
    pub answer_types: Vec<AnswerTypeBreakdown>,
    pub risk: Vec<SubDepartmentRisk>,
}

impl Statistics {
    pub fn answer_type(&self, text: AnswerText) -> Option<&AnswerTypeBreakdown> {
        self.answer_types.iter().find(|b| b.answer_text == text)
    }
}

pub fn compute_statistics(input: &StatisticsInput) -> Statistics {
    let total_questions = input.total_questions();
    let total_answers = input.answers.len() as u64;

    let answer_types = AnswerText::ALL
        .iter()
        .map(|&text| {
            let mut count = 0u64;
            let mut by_control_prefix = BTreeMap::new();
            for fact in input.answers.iter().filter(|f| f.answer_text == text) {
                count += 1;
                for control in &fact.control_numbers {
                    *by_control_prefix.entry(control.prefix().to_string()).or_insert(0u64) += 1;
                }
            }
            AnswerTypeBreakdown {
                answer_text: text,
                count,
                percentage: percentage(count, total_answers),
                by_control_prefix,
            }
        })
        .collect();

    let risk = input
        .question_counts
        .iter()
        .map(|(&sub, &questions)| sub_department_risk(sub, questions, &input.answers))
        .collect();

    Statistics {
        total_questions,
        total_answers,
        percentage_completed: percentage(total_answers, total_questions),
        answer_types,
        risk,
    }
}

fn sub_department_risk(sub: SubDepartmentId, total_questions: u64, answers: &[AnswerFact]) -> SubDepartmentRisk {
    let mut implemented = 0u64;
    let mut gaps = 0u64;
    let mut rated_weight = 0.0;
    let mut gap_weight = 0.0;
    let mut any_rated = false;

    for fact in answers.iter().filter(|f| f.sub_department_id == sub) {
        match fact.answer_text {
            AnswerText::Yes => implemented += 1,
            AnswerText::No => gaps += 1,
            AnswerText::NotApplicable => {}
        }
        if let Some(rating) = fact.risk_rating {
            any_rated = true;
            if fact.answer_text != AnswerText::NotApplicable {
                rated_weight += rating.weight();
                if fact.answer_text == AnswerText::No {
                    gap_weight += rating.weight();
                }
            }
        }
    }

    let coverage = percentage(implemented, total_questions);
    let gap_rate = if total_questions == 0 {
        0.0
    } else {
        gaps as f64 / total_questions as f64 * 100.0
    };
    let weighted = any_rated.then(|| {
        if rated_weight == 0.0 {
            0.0
        } else {
            round2(gap_weight / rated_weight * 100.0)
        }
    });

    SubDepartmentRisk {
        sub_department_id: sub,
        total_questions,
        implemented_count: implemented,
        gap_count: gaps,
        control_coverage_ratio: coverage,
        gap_density_rate: round2(gap_rate),
        department_risk_index: round2(gap_rate * RISK_DAMPING),
        weighted_risk_index: weighted,
        documentation_coverage_ratio: coverage,
        department_compliance_score: coverage,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn fact(sub: SubDepartmentId, text: AnswerText, control: &str) -> AnswerFact {
        AnswerFact {
            sub_department_id: sub,
            answer_text: text,
            control_numbers: vec![ControlNumber::new(control).unwrap()],
            risk_rating: None,
        }
    }

    fn input(sub: SubDepartmentId, questions: u64, answers: Vec<AnswerFact>) -> StatisticsInput {
        StatisticsInput {
            question_counts: BTreeMap::from([(sub, questions)]),
            answers,
        }
    }

    #[test]
    fn ten_questions_six_three_one() {
        let sub = SubDepartmentId::new();
        let mut answers = Vec::new();
        answers.extend((0..6).map(|i| fact(sub, AnswerText::Yes, &format!("A.5-{i}"))));
        answers.extend((0..3).map(|i| fact(sub, AnswerText::No, &format!("A.8-{i}"))));
        answers.push(fact(sub, AnswerText::NotApplicable, "PR.AC-1"));

        let stats = compute_statistics(&input(sub, 10, answers));
        assert_eq!(stats.percentage_completed, 100.0);
        assert_eq!(stats.answer_type(AnswerText::Yes).unwrap().percentage, 60.0);
        assert_eq!(stats.answer_type(AnswerText::No).unwrap().percentage, 30.0);
        assert_eq!(stats.answer_type(AnswerText::NotApplicable).unwrap().percentage, 10.0);
        assert_eq!(stats.answer_type(AnswerText::Yes).unwrap().by_control_prefix["A.5"], 6);
        assert_eq!(stats.answer_type(AnswerText::NotApplicable).unwrap().by_control_prefix["PR.AC"], 1);

        let risk = &stats.risk[0];
        assert_eq!(risk.control_coverage_ratio, 60.0);
        assert_eq!(risk.gap_density_rate, 30.0);
        assert_eq!(risk.department_risk_index, 27.0);
        assert_eq!(risk.documentation_coverage_ratio, risk.control_coverage_ratio);
        assert_eq!(risk.department_compliance_score, risk.control_coverage_ratio);
        assert_eq!(risk.weighted_risk_index, None);
    }

    #[test]
    fn empty_assessment_yields_zeros_not_nan() {
        let stats = compute_statistics(&StatisticsInput::default());
        assert_eq!(stats.percentage_completed, 0.0);
        assert!(stats.answer_types.iter().all(|b| b.percentage == 0.0));
        assert!(stats.risk.is_empty());

        let sub = SubDepartmentId::new();
        let stats = compute_statistics(&input(sub, 0, vec![]));
        assert_eq!(stats.risk[0].gap_density_rate, 0.0);
    }

    #[test]
    fn percentages_round_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn weighted_index_uses_ratings() {
        let sub = SubDepartmentId::new();
        let mut critical_gap = fact(sub, AnswerText::No, "A-1");
        critical_gap.risk_rating = Some(RiskRating::Critical);
        let mut low_ok = fact(sub, AnswerText::Yes, "A-2");
        low_ok.risk_rating = Some(RiskRating::Low);

        let stats = compute_statistics(&input(sub, 2, vec![critical_gap, low_ok]));
        // 1.0 / (1.0 + 0.25)
        assert_eq!(stats.risk[0].weighted_risk_index, Some(80.0));
    }

    #[test]
    fn merge_sums_question_counts() {
        let sub = SubDepartmentId::new();
        let mut a = input(sub, 4, vec![fact(sub, AnswerText::Yes, "A-1")]);
        a.merge(input(sub, 6, vec![fact(sub, AnswerText::No, "A-2")]));
        let stats = compute_statistics(&a);
        assert_eq!(stats.total_questions, 10);
        assert_eq!(stats.total_answers, 2);
        assert_eq!(stats.percentage_completed, 20.0);
    }

    fn answer_text() -> impl Strategy<Value = AnswerText> {
        prop_oneof![
            Just(AnswerText::Yes),
            Just(AnswerText::No),
            Just(AnswerText::NotApplicable)
        ]
    }

    proptest! {
        #[test]
        fn answer_type_percentages_cover_all_answers(
            texts in proptest::collection::vec(answer_text(), 1..60),
            extra_questions in 0u64..20,
        ) {
            let sub = SubDepartmentId::new();
            let answers: Vec<_> = texts.iter().map(|&t| fact(sub, t, "CIS-1")).collect();
            let questions = answers.len() as u64 + extra_questions;
            let stats = compute_statistics(&input(sub, questions, answers));

            let counted: u64 = stats.answer_types.iter().map(|b| b.count).sum();
            prop_assert_eq!(counted, stats.total_answers);

            let sum: f64 = stats.answer_types.iter().map(|b| b.percentage).sum();
            prop_assert!((sum - 100.0).abs() <= 0.02);

            prop_assert!(stats.percentage_completed <= 100.0);
            let risk = &stats.risk[0];
            prop_assert!(risk.control_coverage_ratio + risk.gap_density_rate <= 100.01);
            prop_assert!(risk.department_risk_index <= risk.gap_density_rate);
        }
    }
}
