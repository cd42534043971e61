use tracing::{info, instrument};

use assurance_assessments::Comment;
use assurance_auth::{Action, Permission, Principal, ResourceType};
use assurance_core::{AssessmentQuestionId, CommentId, DomainResult, Page, PageRequest};

use super::{ComplianceServices, ensure_updated, found};
use crate::store::ResourceRef;

impl ComplianceServices {
    #[instrument(skip(self, principal, text), fields(user_id = %principal.user_id), err)]
    pub async fn create_comment(
        &self,
        principal: &Principal,
        question_id: AssessmentQuestionId,
        text: &str,
    ) -> DomainResult<Comment> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Comment, Action::Create),
                ResourceRef::AssessmentQuestion(question_id),
                now,
            )
            .await?;

        let comment = Comment::new(question_id, principal.user_id, text, now)?;
        tx.insert_comment(&comment).await?;
        tx.commit().await?;
        info!(comment_id = %comment.id, "comment created");
        Ok(comment)
    }

    /// Edit a comment. Authors may do so within the edit window; super-admins
    /// at any time.
    #[instrument(skip(self, principal, text), fields(user_id = %principal.user_id), err)]
    pub async fn update_comment(&self, principal: &Principal, id: CommentId, text: &str) -> DomainResult<Comment> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Comment, Action::Update),
                ResourceRef::Comment(id),
                now,
            )
            .await?;

        let mut comment = found(tx.get_comment(id).await?, "comment")?;
        comment.ensure_within_window(&self.comment_policy, principal.is_super_admin(), now)?;
        comment.edit(text, now)?;
        ensure_updated(tx.update_comment(&comment).await?, "comment")?;
        tx.commit().await?;
        Ok(comment)
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn delete_comment(&self, principal: &Principal, id: CommentId) -> DomainResult<()> {
        let now = self.now();
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Comment, Action::Remove),
                ResourceRef::Comment(id),
                now,
            )
            .await?;

        let mut comment = found(tx.get_comment(id).await?, "comment")?;
        comment.ensure_within_window(&self.comment_policy, principal.is_super_admin(), now)?;
        comment.soft_delete(now);
        ensure_updated(tx.update_comment(&comment).await?, "comment")?;
        Ok(tx.commit().await?)
    }

    /// Live comments of a question, oldest first.
    pub async fn list_comments(
        &self,
        principal: &Principal,
        question_id: AssessmentQuestionId,
        page: PageRequest,
    ) -> DomainResult<Page<Comment>> {
        let mut tx = self.begin().await?;
        self.access
            .check(
                tx.as_mut(),
                principal,
                Permission::new(ResourceType::Comment, Action::Read),
                ResourceRef::AssessmentQuestion(question_id),
                self.now(),
            )
            .await?;
        Ok(page.slice(tx.list_comments(question_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use assurance_core::DomainError;

    use super::*;
    use crate::fixtures::World;

    #[tokio::test]
    async fn edit_window_is_enforced_for_authors_only() {
        let world = World::seed(1).await;
        world.start_assessment().await;
        let services = world.services();
        let question = world.questions_of(world.sub_x.id)[0];
        let author = world.assessor_x();

        let comment = services.create_comment(&author, question, "Which policy version?").await.unwrap();

        world.clock.advance(Duration::minutes(19));
        let edited = services.update_comment(&author, comment.id, "Which policy version applies?").await.unwrap();
        assert_eq!(edited.comment_text, "Which policy version applies?");

        world.clock.advance(Duration::minutes(2));
        let err = services.update_comment(&author, comment.id, "too late").await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert!(err.message().contains("time limit exceeded"));
        let err = services.delete_comment(&author, comment.id).await.unwrap_err();
        assert!(err.message().contains("time limit exceeded"));

        services.delete_comment(&world.super_admin(), comment.id).await.unwrap();
        let page = services.list_comments(&author, question, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_items, 0);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_comment() {
        let world = World::seed(1).await;
        world.start_assessment().await;
        let services = world.services();
        let question = world.questions_of(world.sub_x.id)[0];
        let comment = services
            .create_comment(&world.assessor_x(), question, "Evidence attached")
            .await
            .unwrap();

        let err = services.update_comment(&world.reviewer_x(), comment.id, "edited").await.unwrap_err();
        assert_eq!(err, DomainError::forbidden("only the author may modify this comment"));
    }

    #[tokio::test]
    async fn comments_need_a_started_container_and_are_paged() {
        let world = World::seed(1).await;
        let services = world.services();
        let question = world.questions_of(world.sub_x.id)[0];

        let err = services.create_comment(&world.assessor_x(), question, "early").await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        world.start_assessment().await;
        for i in 0..3 {
            services
                .create_comment(&world.assessor_x(), question, &format!("note {i}"))
                .await
                .unwrap();
            world.clock.advance(Duration::seconds(1));
        }
        let page = services
            .list_comments(&world.leadership_x(), question, PageRequest::new(Some(2), Some(2)).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].comment_text, "note 2");

        let err = services.create_comment(&world.assessor_x(), question, "   ").await.unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
    }
}
