//! Question bank and per-assessment question instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assurance_core::{
    AssessmentId, AssessmentQuestionId, DepartmentId, DomainError, DomainResult, Entity,
    MasterDepartmentId, MasterQuestionId, SubAssessmentId, SubDepartmentId, ValueObject,
};

use crate::assessment::Assessment;
use crate::sub_assessment::SubAssessment;

/// Control identifier of a framework, e.g. `A.5-1` or `PR.AC-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlNumber(String);

impl ValueObject for ControlNumber {}

impl ControlNumber {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::bad_request("control number cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Control family: the text before the first `-` (the whole id when
    /// there is none).
    pub fn prefix(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskRating {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRating::Critical => "critical",
            RiskRating::High => "high",
            RiskRating::Medium => "medium",
            RiskRating::Low => "low",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(RiskRating::Critical),
            "high" => Ok(RiskRating::High),
            "medium" => Ok(RiskRating::Medium),
            "low" => Ok(RiskRating::Low),
            other => Err(DomainError::bad_request(format!("unknown risk rating '{other}'"))),
        }
    }
}

/// Framework-neutral question bank row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterQuestion {
    pub id: MasterQuestionId,
    pub master_department_id: MasterDepartmentId,
    pub text: String,
    pub control_numbers: Vec<ControlNumber>,
    pub frameworks: Vec<String>,
    pub risk_rating: Option<RiskRating>,
}

impl Entity for MasterQuestion {
    type Id = MasterQuestionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A master question attached to one sub-assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentQuestion {
    pub id: AssessmentQuestionId,
    pub assessment_id: AssessmentId,
    pub sub_assessment_id: SubAssessmentId,
    pub master_question_id: MasterQuestionId,
    pub created_at: DateTime<Utc>,
}

impl Entity for AssessmentQuestion {
    type Id = AssessmentQuestionId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Rows produced when a department assessment is created from the template.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentBlueprint {
    pub assessment: Assessment,
    pub sub_assessments: Vec<SubAssessment>,
    pub questions: Vec<AssessmentQuestion>,
}

impl AssessmentBlueprint {
    /// One sub-assessment per sub-department, each holding one question per
    /// master question of the department's template.
    pub fn build(
        department_id: DepartmentId,
        sub_departments: &[SubDepartmentId],
        master_questions: &[MasterQuestion],
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if sub_departments.is_empty() {
            return Err(DomainError::bad_request(
                "department has no sub-departments to assess",
            ));
        }
        if master_questions.is_empty() {
            return Err(DomainError::bad_request(
                "no master questions are defined for this department",
            ));
        }
        if let Some(deadline) = deadline {
            if deadline <= now {
                return Err(DomainError::bad_request("deadline must be in the future"));
            }
        }

        let assessment = Assessment::new(AssessmentId::new(), department_id, deadline, now);

        let sub_assessments: Vec<SubAssessment> = sub_departments
            .iter()
            .map(|&sub| SubAssessment::new(SubAssessmentId::new(), assessment.id, sub, deadline, now))
            .collect();

        let questions = sub_assessments
            .iter()
            .flat_map(|sub| {
                master_questions.iter().map(move |mq| AssessmentQuestion {
                    id: AssessmentQuestionId::new(),
                    assessment_id: sub.assessment_id,
                    sub_assessment_id: sub.id,
                    master_question_id: mq.id,
                    created_at: now,
                })
            })
            .collect();

        Ok(Self {
            assessment,
            sub_assessments,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(control: &str) -> MasterQuestion {
        MasterQuestion {
            id: MasterQuestionId::new(),
            master_department_id: MasterDepartmentId::new(),
            text: "Is access reviewed quarterly?".to_string(),
            control_numbers: vec![ControlNumber::new(control).unwrap()],
            frameworks: vec!["ISO27001".to_string()],
            risk_rating: None,
        }
    }

    #[test]
    fn control_prefix_is_text_before_first_dash() {
        assert_eq!(ControlNumber::new("PR.AC-1").unwrap().prefix(), "PR.AC");
        assert_eq!(ControlNumber::new("A.5-1-2").unwrap().prefix(), "A.5");
        assert_eq!(ControlNumber::new("CIS").unwrap().prefix(), "CIS");
        assert!(ControlNumber::new("  ").is_err());
    }

    #[test]
    fn blueprint_multiplies_questions_per_sub_department() {
        let subs = [SubDepartmentId::new(), SubDepartmentId::new()];
        let masters = [master("A.5-1"), master("A.6-2"), master("A.7-3")];
        let bp = AssessmentBlueprint::build(DepartmentId::new(), &subs, &masters, None, Utc::now()).unwrap();

        assert_eq!(bp.sub_assessments.len(), 2);
        assert_eq!(bp.questions.len(), 6);
        assert!(bp.questions.iter().all(|q| q.assessment_id == bp.assessment.id));
        for sub in &bp.sub_assessments {
            assert_eq!(bp.questions.iter().filter(|q| q.sub_assessment_id == sub.id).count(), 3);
        }
    }

    #[test]
    fn blueprint_rejects_empty_templates_and_past_deadlines() {
        let now = Utc::now();
        let subs = [SubDepartmentId::new()];
        assert!(AssessmentBlueprint::build(DepartmentId::new(), &subs, &[], None, now).is_err());
        assert!(AssessmentBlueprint::build(DepartmentId::new(), &[], &[master("A-1")], None, now).is_err());
        assert!(AssessmentBlueprint::build(
            DepartmentId::new(),
            &subs,
            &[master("A-1")],
            Some(now - chrono::Duration::days(1)),
            now
        )
        .is_err());
    }
}
