use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header::RETRY_AFTER},
};
use kappa_access::{Permissions, RateLimit, RateLimitPolicy, hash_password};
use kappa_api::ApiServer;
use kappa_data::{MemoryStore, NewUser, Store};
use kappa_telemetry::Metrics;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Api {
    router: Router,
    store: Arc<dyn Store>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Api {
    fn new(policy: RateLimitPolicy) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let server = ApiServer::new(
            store.clone(),
            Metrics::new()?,
            policy,
            "Kappa API",
            &["http://localhost:3000".to_string()],
        )?;
        Ok(Self {
            router: server.into_router(),
            store,
        })
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> Result<Reply> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Ok(Reply {
            status,
            headers,
            body,
        })
    }

    async fn caregiver(&self, name: &str) -> Result<(String, i64)> {
        let credentials = json!({ "username": name, "password": "secret" });
        let mut registration = credentials.clone();
        registration["name"] = json!(name);
        let created = self
            .call(
                Method::POST,
                "/api/doseguard/caregivers/register",
                None,
                Some(registration),
            )
            .await?;
        assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);

        let login = self
            .call(
                Method::POST,
                "/api/doseguard/caregivers/login",
                None,
                Some(credentials),
            )
            .await?;
        assert_eq!(login.status, StatusCode::OK);
        let key = login.body["apiKey"]
            .as_str()
            .context("login should return an api key")?
            .to_string();
        let id = login.body["caregiverId"]
            .as_i64()
            .context("login should return a caregiver id")?;
        assert_eq!(id, created.body["id"].as_i64().unwrap_or_default());
        Ok((key, id))
    }

    async fn create(&self, key: &str, path: &str, body: Value) -> Result<i64> {
        let reply = self.call(Method::POST, path, Some(key), Some(body)).await?;
        assert_eq!(reply.status, StatusCode::CREATED, "{path}: {:?}", reply.body);
        reply.body["id"].as_i64().context("created record should carry an id")
    }
}

fn ids(body: &Value) -> Vec<i64> {
    body.as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_i64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn caregiver_manages_a_patient_end_to_end() -> Result<()> {
    let api = Api::new(RateLimitPolicy::default())?;
    let (alice, alice_id) = api.caregiver("alice").await?;
    let (bob, bob_id) = api.caregiver("bob").await?;

    let patient = api
        .create(&alice, "/api/doseguard/patients", json!({ "name": "Pat", "age": "71" }))
        .await?;
    let unlinked = api
        .call(Method::GET, &format!("/api/doseguard/patients/{patient}"), Some(&alice), None)
        .await?;
    assert_eq!(unlinked.status, StatusCode::FORBIDDEN);

    let link = json!({ "caregiverId": alice_id, "patientId": patient });
    let attached = api
        .call(Method::POST, "/api/doseguard/caregivers/patients", Some(&alice), Some(link.clone()))
        .await?;
    assert_eq!(attached.status, StatusCode::CREATED);
    assert_eq!(attached.body, link);
    let duplicate = api
        .call(Method::POST, "/api/doseguard/caregivers/patients", Some(&alice), Some(link))
        .await?;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let fetched = api
        .call(Method::GET, &format!("/api/doseguard/patients/{patient}"), Some(&alice), None)
        .await?;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["age"], json!(71));
    assert_eq!(fetched.body["createdBy"], json!(alice_id));

    let pill = api
        .create(&alice, "/api/doseguard/pills", json!({ "name": "Aspirin", "strength": 81 }))
        .await?;
    let dose = api
        .create(
            &alice,
            "/api/doseguard/doses",
            json!({ "pillId": pill, "interval": 8, "amount": 1 }),
        )
        .await?;
    let schedule = api
        .create(&alice, "/api/doseguard/schedules", json!({ "name": "Morning" }))
        .await?;
    for (path, body) in [
        (
            "/api/doseguard/patients/schedules",
            json!({ "patientId": patient, "scheduleId": schedule }),
        ),
        (
            "/api/doseguard/schedules/doses",
            json!({ "scheduleId": schedule, "doseId": dose }),
        ),
    ] {
        let reply = api.call(Method::POST, path, Some(&alice), Some(body)).await?;
        assert_eq!(reply.status, StatusCode::CREATED, "{path}");
    }

    let all_doses = api
        .call(
            Method::GET,
            &format!("/api/doseguard/patients/{patient}/all-doses"),
            Some(&alice),
            None,
        )
        .await?;
    assert_eq!(all_doses.status, StatusCode::OK);
    assert_eq!(ids(&all_doses.body), vec![dose]);

    let entry = api
        .create(
            &alice,
            "/api/doseguard/dose-history",
            json!({ "patientId": patient, "doseId": dose, "taken": "yes" }),
        )
        .await?;
    let history = api
        .call(
            Method::GET,
            &format!("/api/doseguard/patients/{patient}/dose-history"),
            Some(&alice),
            None,
        )
        .await?;
    assert_eq!(ids(&history.body), vec![entry]);
    let by_pill = api
        .call(
            Method::GET,
            &format!("/api/doseguard/pills/{pill}/dose-history"),
            Some(&alice),
            None,
        )
        .await?;
    assert_eq!(ids(&by_pill.body), vec![entry]);

    // Bob sees none of it.
    for path in [
        format!("/api/doseguard/patients/{patient}"),
        format!("/api/doseguard/pills/{pill}"),
        format!("/api/doseguard/doses/{dose}"),
        format!("/api/doseguard/schedules/{schedule}"),
        format!("/api/doseguard/dose-history/{entry}"),
        format!("/api/doseguard/caregivers/{alice_id}"),
    ] {
        let reply = api.call(Method::GET, &path, Some(&bob), None).await?;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{path}");
    }
    let claim = api
        .call(
            Method::POST,
            "/api/doseguard/caregivers/patients",
            Some(&bob),
            Some(json!({ "caregiverId": bob_id, "patientId": patient })),
        )
        .await?;
    assert_eq!(claim.status, StatusCode::FORBIDDEN);
    let foreign_pill = api
        .call(
            Method::POST,
            "/api/doseguard/doses",
            Some(&bob),
            Some(json!({ "pillId": pill, "interval": 4, "amount": 2 })),
        )
        .await?;
    assert_eq!(foreign_pill.status, StatusCode::FORBIDDEN);
    let bob_pills = api
        .call(Method::GET, "/api/doseguard/pills", Some(&bob), None)
        .await?;
    assert_eq!(bob_pills.body, json!([]));

    // Soft delete hides the dose everywhere.
    let deleted = api
        .call(Method::DELETE, &format!("/api/doseguard/doses/{dose}"), Some(&alice), None)
        .await?;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body, json!({ "message": "Deleted" }));
    let gone = api
        .call(Method::GET, &format!("/api/doseguard/doses/{dose}"), Some(&alice), None)
        .await?;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.body["detail"], json!("Dose not found"));
    let remaining = api
        .call(
            Method::GET,
            &format!("/api/doseguard/patients/{patient}/all-doses"),
            Some(&alice),
            None,
        )
        .await?;
    assert_eq!(remaining.body, json!([]));

    let detached = api
        .call(
            Method::DELETE,
            "/api/doseguard/patients/schedules",
            Some(&alice),
            Some(json!({ "patientId": patient, "scheduleId": schedule })),
        )
        .await?;
    assert_eq!(detached.status, StatusCode::OK);
    let detached_again = api
        .call(
            Method::DELETE,
            "/api/doseguard/patients/schedules",
            Some(&alice),
            Some(json!({ "patientId": patient, "scheduleId": schedule })),
        )
        .await?;
    assert_eq!(detached_again.status, StatusCode::NOT_FOUND);
    assert_eq!(
        detached_again.body["detail"],
        json!("Patient-schedule link not found")
    );
    Ok(())
}

#[tokio::test]
async fn handlers_validate_before_touching_records() -> Result<()> {
    let api = Api::new(RateLimitPolicy::default())?;
    let (alice, _) = api.caregiver("alice").await?;

    let missing = api
        .call(Method::POST, "/api/doseguard/pills", Some(&alice), Some(json!({ "name": "x" })))
        .await?;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["detail"], json!("strength required"));

    let wrong_type = api
        .call(
            Method::POST,
            "/api/doseguard/dose-history",
            Some(&alice),
            Some(json!({ "patientId": 1, "doseId": 1, "taken": "sometimes" })),
        )
        .await?;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_type.body["invalid_params"][0]["pointer"], json!("/taken"));

    let absent = api
        .call(
            Method::PATCH,
            "/api/doseguard/schedules/4242",
            Some(&alice),
            Some(json!({ "name": "Evening" })),
        )
        .await?;
    assert_eq!(absent.status, StatusCode::NOT_FOUND);

    let dangling = api
        .call(
            Method::POST,
            "/api/doseguard/doses",
            Some(&alice),
            Some(json!({ "pillId": 4242, "interval": 8, "amount": 1 })),
        )
        .await?;
    assert_eq!(dangling.status, StatusCode::NOT_FOUND);
    assert_eq!(dangling.body["detail"], json!("Pill not found"));
    Ok(())
}

#[tokio::test]
async fn authentication_and_permission_gates() -> Result<()> {
    let api = Api::new(RateLimitPolicy::default())?;

    let anonymous = api.call(Method::GET, "/api/user", None, None).await?;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["detail"], json!("Missing API key"));
    let request_id = anonymous
        .headers
        .get("x-request-id")
        .context("x-request-id header")?
        .to_str()?;
    assert_eq!(anonymous.body["request_id"], json!(request_id));

    let forged = api
        .call(Method::GET, "/api/user", Some("not-a-key"), None)
        .await?;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.body["detail"], json!("Invalid API key"));

    let registered = api
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "gina", "password": "pw" })),
        )
        .await?;
    assert_eq!(registered.status, StatusCode::CREATED);
    let general = registered.body["apiKey"]
        .as_str()
        .context("register should return an api key")?
        .to_string();

    let me = api
        .call(Method::GET, &format!("/api/user?api_key={general}"), None, None)
        .await?;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], json!("gina"));
    assert!(me.body["lastUse"].is_string());
    assert!(me.headers.contains_key("x-ratelimit-remaining"));

    for path in ["/api/doseguard/pills", "/api/admin/users"] {
        let denied = api.call(Method::GET, path, Some(&general), None).await?;
        assert_eq!(denied.status, StatusCode::FORBIDDEN, "{path}");
        assert_eq!(denied.body["detail"], json!("Insufficient permissions"));
    }

    let admin = api
        .store
        .create_user(NewUser {
            username: "root".into(),
            password_hash: hash_password("root")?,
            perms: Permissions::ALL,
        })
        .await?;
    let users = api
        .call(Method::GET, "/api/admin/users", Some(&admin.api_key), None)
        .await?;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body.as_array().map(Vec::len), Some(2));

    // Admins without a caregiver profile pass the gate but own nothing.
    let no_profile = api
        .call(Method::GET, "/api/doseguard/pills", Some(&admin.api_key), None)
        .await?;
    assert_eq!(no_profile.status, StatusCode::FORBIDDEN);

    let post = json!({
        "imageURL": "https://img.example/1.png",
        "title": "One",
        "description": "First",
        "category": "art"
    });
    let rejected = api
        .call(Method::POST, "/api/portfolio/posts", Some(&general), Some(post.clone()))
        .await?;
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);
    let created = api
        .call(Method::POST, "/api/portfolio/posts", Some(&admin.api_key), Some(post))
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    let listed = api.call(Method::GET, "/api/portfolio/posts", None, None).await?;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(1));

    let gone = api
        .call(Method::DELETE, "/api/user", Some(&general), None)
        .await?;
    assert_eq!(gone.status, StatusCode::OK);
    assert_eq!(gone.body, json!({}));
    let after = api.call(Method::GET, "/api/user", Some(&general), None).await?;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn exhausted_buckets_return_429_with_headers() -> Result<()> {
    let api = Api::new(RateLimitPolicy {
        anonymous: RateLimit {
            burst: 2,
            replenish_period: Duration::from_secs(60),
        },
        ..RateLimitPolicy::default()
    })?;

    for _ in 0..2 {
        let ok = api.call(Method::GET, "/api/portfolio/posts", None, None).await?;
        assert_eq!(ok.status, StatusCode::OK);
    }
    let throttled = api.call(Method::GET, "/api/portfolio/posts", None, None).await?;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.headers[RETRY_AFTER], "30");
    assert_eq!(throttled.headers["x-ratelimit-limit"], "2");
    assert_eq!(throttled.headers["x-ratelimit-remaining"], "0");

    let health = api.call(Method::GET, "/api/health", None, None).await?;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["app"], json!("Kappa API"));
    assert!(health.headers.contains_key("x-request-id"));

    let metrics = api.call(Method::GET, "/api/metrics", None, None).await?;
    let text = metrics.body.as_str().unwrap_or_default();
    assert!(text.contains("api_rate_limit_throttled_total 1"));
    assert!(text.contains(r#"route="/api/portfolio/posts""#));
    assert!(!text.contains("/api/doseguard/pills/"));

    api.call(Method::GET, "/api/doseguard/pills/81", None, None)
        .await?;
    let metrics = api.call(Method::GET, "/api/metrics", None, None).await?;
    let text = metrics.body.as_str().unwrap_or_default();
    assert!(text.contains(r#"route="/api/doseguard/pills/{id}""#));
    assert!(!text.contains("/api/doseguard/pills/81"));
    Ok(())
}
