mod common;

use serde_json::{json, Value};

use common::id_of;

async fn bootcamp_json(server: &axum_test::TestServer, id: &str) -> Value {
    server
        .get(&format!("/api/v1/bootcamps/{id}"))
        .await
        .json::<Value>()["data"]
        .clone()
}

#[tokio::test]
async fn average_cost_follows_courses() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let token = env
        .register(&server, "Publisher", "publisher@gmail.com", "publisher")
        .await;
    let bootcamp = env.create_bootcamp(&server, &token, "Cost Camp", "Boston MA").await;
    let bootcamp_id = id_of(&bootcamp);

    let first = env
        .create_course(&server, &token, &bootcamp_id, "Front End", 8000.0)
        .await;
    assert_eq!(bootcamp_json(&server, &bootcamp_id).await["averageCost"], 8000.0);

    let second = env
        .create_course(&server, &token, &bootcamp_id, "Back End", 10001.0)
        .await;
    // ceil(9000.5 / 10) * 10
    assert_eq!(bootcamp_json(&server, &bootcamp_id).await["averageCost"], 9010.0);

    server
        .put(&format!("/api/v1/courses/{}", id_of(&second)))
        .authorization_bearer(&token)
        .json(&json!({ "tuition": 12000 }))
        .await;
    assert_eq!(bootcamp_json(&server, &bootcamp_id).await["averageCost"], 10000.0);

    for course in [&first, &second] {
        server
            .delete(&format!("/api/v1/courses/{}", id_of(course)))
            .authorization_bearer(&token)
            .await;
    }
    let bootcamp = bootcamp_json(&server, &bootcamp_id).await;
    assert!(
        bootcamp.get("averageCost").is_none(),
        "averageCost should be unset, got {bootcamp}"
    );
}

#[tokio::test]
async fn course_lookup_joins_bootcamp() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let token = env
        .register(&server, "Publisher", "publisher@gmail.com", "publisher")
        .await;
    let bootcamp = env.create_bootcamp(&server, &token, "Join Camp", "Boston MA").await;
    let course = env
        .create_course(&server, &token, &id_of(&bootcamp), "Data Science", 12000.0)
        .await;

    let body = server
        .get(&format!("/api/v1/courses/{}", id_of(&course)))
        .await
        .json::<Value>();

    let joined = &body["data"]["bootcamp"];
    assert_eq!(joined["name"], "Join Camp");
    assert!(joined.get("description").is_some());
    assert!(joined.get("careers").is_none(), "only name and description are joined");

    let listed = server.get("/api/v1/courses").await.json::<Value>();
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["data"][0]["bootcamp"]["name"], "Join Camp");
}

#[tokio::test]
async fn only_bootcamp_owner_adds_courses() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();
    let owner = env
        .register(&server, "Owner", "owner@gmail.com", "publisher")
        .await;
    let stranger = env
        .register(&server, "Stranger", "stranger@gmail.com", "publisher")
        .await;
    let bootcamp = env.create_bootcamp(&server, &owner, "Owned Camp", "Boston MA").await;

    let response = server
        .post(&format!("/api/v1/bootcamps/{}/courses", id_of(&bootcamp)))
        .authorization_bearer(&stranger)
        .json(&json!({
            "title": "Intruder",
            "description": "Should fail",
            "weeks": 4,
            "tuition": 100,
            "minimumSkill": "advanced",
        }))
        .await;

    response.assert_status_unauthorized();
    let error = response.json::<Value>()["error"].as_str().unwrap().to_string();
    assert!(error.ends_with(&format!(
        "is not authorized to add a course to bootcamp {}",
        id_of(&bootcamp)
    )));
}

#[tokio::test]
async fn course_for_missing_bootcamp() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();
    let token = env
        .register(&server, "Publisher", "publisher@gmail.com", "publisher")
        .await;
    let missing = mongodb::bson::oid::ObjectId::new();

    let response = server
        .post(&format!("/api/v1/bootcamps/{missing}/courses"))
        .authorization_bearer(&token)
        .json(&json!({
            "title": "Orphan",
            "description": "No parent",
            "weeks": "6",
            "tuition": 500,
            "minimumSkill": "beginner",
        }))
        .await;

    response.assert_status_not_found();
    assert_eq!(
        response.json::<Value>()["error"],
        format!("No bootcamp with the id of {missing}")
    );
}

#[tokio::test]
async fn invalid_skill_is_a_bad_request() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();
    let token = env
        .register(&server, "Publisher", "publisher@gmail.com", "publisher")
        .await;
    let bootcamp = env.create_bootcamp(&server, &token, "Skill Camp", "Boston MA").await;

    let response = server
        .post(&format!("/api/v1/bootcamps/{}/courses", id_of(&bootcamp)))
        .authorization_bearer(&token)
        .json(&json!({
            "title": "Bad skill",
            "description": "Unknown level",
            "weeks": "6",
            "tuition": 500,
            "minimumSkill": "wizard",
        }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["success"], false);
}
