use axum::{
    Router,
    routing::{get, post, put},
};

pub mod access;
pub mod answers;
pub mod assessments;
pub mod comments;
pub mod organization;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/access", access::router())
        // Organisation
        .route("/companies", post(organization::create_company))
        .route("/companies/:id", get(organization::get_company))
        .route("/companies/:id/departments", post(organization::create_department))
        .route("/companies/:id/statistics", get(organization::company_statistics))
        .route(
            "/departments/:id/sub-departments",
            get(organization::list_sub_departments).post(organization::create_sub_department),
        )
        .route("/users", post(organization::create_user))
        .route("/users/:id", get(organization::get_user))
        .route("/master-questions", post(organization::create_master_question))
        // Assessments
        .route(
            "/departments/:id/assessments",
            get(assessments::list_assessments).post(assessments::create_assessment),
        )
        .route("/assessments/:id", get(assessments::get_assessment))
        .route("/assessments/:id/statistics", get(assessments::assessment_statistics))
        .route("/assessments/:id/transitions/:transition", post(assessments::transition_assessment))
        .route("/sub-assessments/:id", get(assessments::get_sub_assessment))
        .route("/sub-assessments/:id/questions", get(assessments::list_questions))
        .route("/sub-assessments/:id/transitions/:transition", post(assessments::transition_sub_assessment))
        // Answers and evidence
        .route("/questions/:id/answers", post(answers::create_answer))
        .route(
            "/answers/:id",
            get(answers::get_answer).put(answers::update_answer).delete(answers::delete_answer),
        )
        .route("/answers/:id/review", post(answers::review_answer))
        .route("/answers/:id/evidence", get(answers::list_evidence).post(answers::add_evidence))
        .route("/evidence/:id", get(answers::download_evidence).delete(answers::remove_evidence))
        // Comments
        .route(
            "/questions/:id/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/comments/:id", put(comments::update_comment).delete(comments::delete_comment))
}
