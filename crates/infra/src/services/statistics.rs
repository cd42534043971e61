use tracing::{debug, instrument};

use assurance_assessments::{Statistics, compute_statistics};
use assurance_auth::{Action, Permission, Principal, ResourceType};
use assurance_core::{AssessmentId, CompanyId, DomainResult};

use super::ComplianceServices;
use crate::store::{ResourceRef, StatsScope};

const READ_STATISTICS: Permission = Permission::new(ResourceType::Statistics, Action::Read);

impl ComplianceServices {
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn assessment_statistics(&self, principal: &Principal, id: AssessmentId) -> DomainResult<Statistics> {
        self.statistics(principal, ResourceRef::Assessment(id), StatsScope::Assessment(id))
            .await
    }

    /// Statistics over every assessment of a company.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn company_statistics(&self, principal: &Principal, id: CompanyId) -> DomainResult<Statistics> {
        self.statistics(principal, ResourceRef::Company(id), StatsScope::Company(id))
            .await
    }

    async fn statistics(&self, principal: &Principal, target: ResourceRef, scope: StatsScope) -> DomainResult<Statistics> {
        let mut tx = self.begin().await?;
        self.access
            .check(tx.as_mut(), principal, READ_STATISTICS, target, self.now())
            .await?;
        let input = tx.statistics_input(scope).await?;
        debug!(questions = input.total_questions(), answers = input.answers.len(), "statistics input loaded");
        Ok(compute_statistics(&input))
    }
}

#[cfg(test)]
mod tests {
    use assurance_assessments::AnswerText;
    use assurance_auth::Role;
    use assurance_core::{DomainError, UserId};

    use super::*;
    use crate::fixtures::{World, pdf};
    use crate::services::AnswerInput;

    async fn answer_six_three_one(world: &World) {
        let services = world.services();
        for (i, question) in world.questions_of(world.sub_x.id).into_iter().enumerate() {
            let input = match i {
                0..=5 => AnswerInput::new(AnswerText::Yes, vec![pdf("control.pdf")]),
                6..=8 => AnswerInput::new(AnswerText::No, vec![]),
                _ => AnswerInput::new(AnswerText::NotApplicable, vec![]),
            };
            services.create_answer(&world.assessor_x(), question, input).await.unwrap();
        }
    }

    #[tokio::test]
    async fn six_yes_three_no_one_not_applicable() {
        let world = World::seed(10).await;
        world.start_assessment().await;
        answer_six_three_one(&world).await;

        let stats = world
            .services()
            .assessment_statistics(&world.assessor_x(), world.blueprint.assessment.id)
            .await
            .unwrap();

        // Sub-department Y has its own ten unanswered questions.
        assert_eq!(stats.total_questions, 20);
        assert_eq!(stats.total_answers, 10);
        assert_eq!(stats.percentage_completed, 50.0);
        assert_eq!(stats.answer_type(AnswerText::Yes).unwrap().percentage, 60.0);
        assert_eq!(stats.answer_type(AnswerText::No).unwrap().percentage, 30.0);
        assert_eq!(stats.answer_type(AnswerText::NotApplicable).unwrap().percentage, 10.0);

        let yes = stats.answer_type(AnswerText::Yes).unwrap();
        assert_eq!(yes.by_control_prefix.get("A.5"), Some(&3));
        assert_eq!(yes.by_control_prefix.get("A.6"), Some(&3));

        let x = stats.risk.iter().find(|r| r.sub_department_id == world.sub_x.id).unwrap();
        assert_eq!(x.total_questions, 10);
        assert_eq!(x.control_coverage_ratio, 60.0);
        assert_eq!(x.gap_density_rate, 30.0);
        assert_eq!(x.department_risk_index, 27.0);
        // Only the first question is rated, and it was answered yes.
        assert_eq!(x.weighted_risk_index, Some(0.0));

        let y = stats.risk.iter().find(|r| r.sub_department_id == world.sub_y.id).unwrap();
        assert_eq!(y.control_coverage_ratio, 0.0);
        assert_eq!(y.weighted_risk_index, None);
    }

    #[tokio::test]
    async fn company_statistics_cover_every_assessment_and_stay_in_tenant() {
        let world = World::seed(10).await;
        world.start_assessment().await;
        answer_six_three_one(&world).await;
        let services = world.services();

        let stats = services.company_statistics(&world.admin(), world.company.id).await.unwrap();
        assert_eq!(stats.total_answers, 10);
        assert_eq!(stats.total_questions, 20);

        let outsider = Principal::new(UserId::new(), Role::Admin, Some(CompanyId::new()));
        let err = services.company_statistics(&outsider, world.company.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = services
            .assessment_statistics(&world.super_admin(), AssessmentId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
