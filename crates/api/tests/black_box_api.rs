use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

use assurance_auth::{JwtClaims, Role, RolePermissionTable};
use assurance_core::{CompanyId, DepartmentId, SubDepartmentId, UserId};
use assurance_infra::{AppConfig, ComplianceServices, InMemoryComplianceStore};

const SECRET: &str = "black-box-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, over the in-memory store, on an ephemeral port.
        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .expect("config");
        let services = ComplianceServices::new(
            Arc::new(InMemoryComplianceStore::new()),
            Arc::new(RolePermissionTable::builtin()),
        );
        let app = assurance_api::app::build_router(services, &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn post_empty(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).bearer_auth(token).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(
    role: Role,
    company_id: Option<CompanyId>,
    departments: &[DepartmentId],
    sub_departments: &[SubDepartmentId],
) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        role,
        company_id,
        department_ids: departments.iter().copied().collect::<BTreeSet<_>>(),
        sub_department_ids: sub_departments.iter().copied().collect::<BTreeSet<_>>(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn id_of<T: std::str::FromStr>(value: &Value) -> T
where
    T::Err: std::fmt::Debug,
{
    value.as_str().expect("id is a string").parse().expect("id parses")
}

fn pdf_part(name: &str) -> Part {
    Part::bytes(b"%PDF-1.7\n% evidence\n".to_vec())
        .file_name(name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}

/// Company, one department with sub-departments X and Y, two bank questions
/// and an assessment over them.
struct Org {
    company: CompanyId,
    department: DepartmentId,
    sub_x: SubDepartmentId,
    sub_y: SubDepartmentId,
    assessment: String,
    sub_assessment_x: String,
}

async fn build_org(server: &TestServer) -> Org {
    let root = mint_jwt(Role::SuperAdmin, None, &[], &[]);
    let master_department = uuid::Uuid::now_v7().to_string();

    let (status, body) = server
        .post_json(&root, "/companies", json!({ "name": "Acme Ltd", "contactEmail": "grc@acme.test" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let company: CompanyId = id_of(&body["company"]["id"]);

    let (status, body) = server
        .post_json(
            &root,
            &format!("/companies/{company}/departments"),
            json!({ "name": "Security", "masterDepartmentId": master_department }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let department: DepartmentId = id_of(&body["department"]["id"]);

    let mut subs = Vec::new();
    for name in ["Network", "Identity"] {
        let (status, body) = server
            .post_json(&root, &format!("/departments/{department}/sub-departments"), json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        subs.push(id_of::<SubDepartmentId>(&body["subDepartment"]["id"]));
    }

    for (text, control, risk) in [
        ("Is an access control policy approved?", "A.5.15", "high"),
        ("Are privileged rights reviewed?", "A.8.2", "critical"),
    ] {
        let (status, body) = server
            .post_json(
                &root,
                "/master-questions",
                json!({
                    "masterDepartmentId": master_department,
                    "text": text,
                    "controlNumbers": [control],
                    "frameworks": ["ISO 27001"],
                    "riskRating": risk,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, body) = server
        .post_json(&root, &format!("/departments/{department}/assessments"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let assessment = body["assessment"]["id"].as_str().unwrap().to_string();
    let sub_assessments = body["assessment"]["subAssessments"].as_array().unwrap();
    assert_eq!(sub_assessments.len(), 2);
    let sub_assessment_x = sub_assessments
        .iter()
        .find(|s| s["subDepartmentId"] == json!(subs[0]))
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    Org {
        company,
        department,
        sub_x: subs[0],
        sub_y: subs[1],
        assessment,
        sub_assessment_x,
    }
}

#[tokio::test]
async fn rejects_requests_without_a_bearer_token() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client.get(server.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["messages"].as_array().is_some_and(|m| !m.is_empty()));

    let res = server
        .client
        .get(server.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_echoes_the_token_and_role_permissions() {
    let server = TestServer::spawn().await;
    let company = CompanyId::new();
    let department = DepartmentId::new();
    let token = mint_jwt(Role::Reviewer, Some(company), &[department], &[]);

    let (status, body) = server.get(&token, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], json!("reviewer"));
    assert_eq!(body["companyId"], json!(company));
    assert_eq!(body["departmentIds"], json!([department]));
    let permissions = body["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("answer.review")));
    assert!(!permissions.contains(&json!("answer.create")));
}

#[tokio::test]
async fn assessment_flow_over_http() {
    let server = TestServer::spawn().await;
    let org = build_org(&server).await;

    let admin = mint_jwt(Role::Admin, Some(org.company), &[], &[]);
    let assessor_x = mint_jwt(Role::Assessor, Some(org.company), &[org.department], &[org.sub_x]);
    let assessor_y = mint_jwt(Role::Assessor, Some(org.company), &[org.department], &[org.sub_y]);

    let (status, body) = server
        .post_empty(&admin, &format!("/assessments/{}/transitions/start", org.assessment))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["assessment"]["lifecycle"]["started"], json!(true));

    let (status, body) = server
        .post_empty(&admin, &format!("/assessments/{}/transitions/start", org.assessment))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = server
        .get(&assessor_x, &format!("/sub-assessments/{}/questions?itemsPerPage=10", org.sub_assessment_x))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["totalItems"], json!(2));
    let question = body["items"][0]["id"].as_str().unwrap().to_string();

    // "yes" without evidence is rejected.
    let res = server
        .client
        .post(server.url(&format!("/questions/{question}/answers")))
        .bearer_auth(&assessor_x)
        .multipart(Form::new().text("answerText", "yes"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .post(server.url(&format!("/questions/{question}/answers")))
        .bearer_auth(&assessor_x)
        .multipart(Form::new().text("answerText", "yes").part("files", pdf_part("policy.pdf")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let evidence = body["answer"]["evidence"].as_array().unwrap();
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0]["originalName"], json!("policy.pdf"));
    let evidence_id = evidence[0]["id"].as_str().unwrap().to_string();

    let res = server
        .client
        .get(server.url(&format!("/evidence/{evidence_id}")))
        .bearer_auth(&assessor_x)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF"));

    // Same department, other sub-department.
    let res = server
        .client
        .post(server.url(&format!("/questions/{question}/answers")))
        .bearer_auth(&assessor_y)
        .multipart(Form::new().text("answerText", "no"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (status, body) = server
        .post_json(
            &assessor_x,
            &format!("/questions/{question}/comments"),
            json!({ "commentText": "Policy v3 attached" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = server
        .get(&assessor_x, &format!("/assessments/{}/statistics", org.assessment))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["statistics"]["totalQuestions"], json!(4));
    assert_eq!(body["statistics"]["totalAnswers"], json!(1));
    assert_eq!(body["statistics"]["percentageCompleted"], json!(25.0));
}

#[tokio::test]
async fn errors_use_the_failure_envelope() {
    let server = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin, Some(CompanyId::new()), &[], &[]);

    let (status, body) = server.get(&admin, "/assessments/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));

    let (status, body) = server
        .post_json(&admin, "/companies", json!({ "name": "Not allowed" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], json!(false));

    let (status, body) = server
        .get(
            &admin,
            &format!("/access/explain?resourceType=assessment&action=start&resourceId={}", uuid::Uuid::now_v7()),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], json!(true));
    assert!(body["explanation"].is_object());
}
