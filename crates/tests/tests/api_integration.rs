use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use safarai_api::config::{
    GoogleOAuthConfig, RateLimitSettings, GOOGLE_TOKEN_URL, GOOGLE_USERINFO_URL,
};
use safarai_api::{build_router, build_state, ApiConfig, ApiState};
use safarai_core::Role;
use safarai_planner::GenerativeConfig;
use safarai_storage::UserRepository;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "karakoram-99";

const MODEL_REPLY: &str = "Here is your plan!\n\n\
**Day 1: 2025-11-05 (Naran)**\n\
Morning Activity:\nTitle: Drive to Naran\nBudget: PKR 6,000\nDescription: Leave Islamabad early via the Karakoram Highway.\n\
Afternoon Activity:\nTitle: Lunch by the river\nBudget: PKR 2,500\nDescription: Trout at a riverside dhaba.\n\
Evening Activity:\nTitle: Bazaar walk\nBudget: PKR 1,000\nDescription: Stroll through Naran bazaar.\n\n\
**Day 2: 2025-11-06 (Saiful Muluk)**\n\
Morning Activity:\nTitle: Jeep to Lake Saiful Muluk\nBudget: PKR 5,000\nDescription: Shared jeep from Naran.\n\
Evening Activity:\nTitle: Bonfire\nBudget: PKR 1,500\nDescription: Bonfire at the hotel lawn.\n\n\
Notes: Roads can close after heavy rain. Keep cash, ATMs are scarce.";

struct TestApp {
    app: Router,
    state: ApiState,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn test_config() -> ApiConfig {
    ApiConfig {
        bcrypt_cost: 4,
        ..ApiConfig::default()
    }
}

impl TestApp {
    async fn new(config: ApiConfig) -> Self {
        let state = build_state(config).await.expect("state should build");
        Self {
            app: build_router(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    fn outbox_html(&self) -> String {
        self.state
            .mailer
            .outbox()
            .last()
            .map(|email| email.html.clone())
            .expect("an email should have been recorded")
    }

    fn latest_otp(&self) -> String {
        let html = self.outbox_html();
        let start = html.find("<strong>").expect("otp markup") + "<strong>".len();
        let end = html[start..].find("</strong>").expect("otp markup") + start;
        html[start..end].to_string()
    }

    fn latest_reset_token(&self) -> String {
        let html = self.outbox_html();
        let start = html.find("/reset-password/").expect("reset link") + "/reset-password/".len();
        html[start..]
            .chars()
            .take_while(|ch| ch.is_ascii_hexdigit())
            .collect()
    }

    async fn register(&self, email: &str) -> String {
        let reply = self
            .call(
                "POST",
                "/api/auth/register",
                Some(json!({ "email": email, "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["data"].as_str().expect("user id").to_string()
    }

    async fn verified_user(&self, email: &str) -> String {
        let user_id = self.register(email).await;
        let otp = self.latest_otp();
        let reply = self
            .call(
                "POST",
                "/api/auth/verify-email",
                Some(json!({ "otp": otp, "userId": user_id })),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        user_id
    }

    async fn login(&self, email: &str, password: &str) -> Reply {
        self.call(
            "POST",
            "/api/auth/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    async fn token_for(&self, email: &str) -> String {
        let reply = self.login(email, PASSWORD).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        reply.body["data"]["token"].as_str().expect("token").to_string()
    }
}

fn cookie_pair(headers: &HeaderMap) -> String {
    headers
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie header should be present")
        .split(';')
        .next()
        .expect("cookie pair should be present")
        .to_string()
}

async fn spawn_model(reply: &'static str) -> String {
    let app = Router::new().route(
        "/v1beta/models/{model}",
        post(move || async move {
            Json(json!({
                "candidates": [ { "content": { "role": "model", "parts": [ { "text": reply } ] } } ]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

async fn app_with_model(reply: &'static str) -> TestApp {
    let base_url = spawn_model(reply).await;
    TestApp::new(ApiConfig {
        gemini: Some(GenerativeConfig {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            base_url,
        }),
        ..test_config()
    })
    .await
}

fn google_config(token_url: String, userinfo_url: String) -> GoogleOAuthConfig {
    GoogleOAuthConfig {
        client_id: "client-123".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost:8080/api/auth/google/callback".to_string(),
        frontend_origin: "http://localhost:3000".to_string(),
        token_url,
        userinfo_url,
    }
}

/// Stands in for Google's token and userinfo endpoints. The access token is
/// the authorization code, and the account email is `{code}@example.com`.
async fn spawn_google() -> String {
    let app = Router::new()
        .route(
            "/token",
            post(|body: String| async move {
                assert!(body.contains("code_verifier="));
                assert!(body.contains("grant_type=authorization_code"));
                let code = body
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("code="))
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "access_token": code, "token_type": "Bearer" }))
            }),
        )
        .route(
            "/userinfo",
            get(|headers: HeaderMap| async move {
                let token = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "email": format!("{token}@example.com"), "verified_email": true }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

async fn google_round_trip(app: &TestApp, code: &str) -> Reply {
    let start = app
        .call("GET", "/api/auth/google/start?returnTo=/trips", None, None)
        .await;
    assert_eq!(start.status, StatusCode::OK);
    let url = start.body["data"]["authorizeUrl"].as_str().unwrap();
    let state_start = url.find("&state=").expect("state parameter") + "&state=".len();
    let state_token = url[state_start..].split('&').next().unwrap();

    app.call(
        "GET",
        &format!("/api/auth/google/callback?code={code}&state={state_token}"),
        None,
        None,
    )
    .await
}

fn trip_form() -> Value {
    json!({
        "name": "Northern escape",
        "destinations": ["Naran", "Saiful Muluk"],
        "startDate": "2025-11-05",
        "endDate": "2025-11-06",
        "duration": 2,
        "budget": 60000,
        "tripType": "adventure",
        "transportation": "car",
        "accommodation": "hotel",
        "tripPace": "relaxed",
        "specialOccasion": "none",
        "interests": ["hiking", "lakes"],
        "diningPreferences": ["local"],
        "dietaryRestrictions": ["halal"]
    })
}

#[tokio::test]
async fn health_is_public_and_reports_capabilities() {
    let app = TestApp::new(test_config()).await;

    let reply = app.call("GET", "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["storage"], "memory");
    assert_eq!(reply.body["mailTransport"], "log");
    assert_eq!(reply.body["capabilities"]["itineraryGeneration"], false);
    assert!(reply.headers.get("x-request-id").is_some());

    let traced = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-health-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(traced.headers.get("x-request-id").unwrap(), "req-health-1");
    assert_eq!(
        reply.headers.get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn register_verify_login_and_session_flow() {
    let app = TestApp::new(test_config()).await;
    let user_id = app.register("Sana@Example.com ").await;

    let blocked = app.login("sana@example.com", PASSWORD).await;
    assert_eq!(blocked.status, StatusCode::FORBIDDEN);
    assert_eq!(blocked.body["message"], "Please verify you account first");

    let wrong = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": "000000", "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body["message"], "Incorrect Otp");

    let otp = app.latest_otp();
    let verified = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": otp, "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body["success"], true);

    let again = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": otp, "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(again.body["message"], "Email already verified");

    let duplicate = app
        .call(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "sana@example.com", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.body["message"], "User already exists, please login");

    let bad_password = app.login("sana@example.com", "not-the-password").await;
    assert_eq!(bad_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad_password.body["message"], "Invalid credentials");

    let unknown = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.body["message"], "No user found with this email");

    let login = app.login("sana@example.com", PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
    let token = login.body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(login.body["data"]["user"]["id"], user_id.as_str());
    assert_eq!(login.body["data"]["user"]["username"], "sana");
    assert!(login.body["data"]["user"].get("passwordHash").is_none());
    let cookie = cookie_pair(&login.headers);
    assert!(cookie.starts_with("safarai_session="));

    let me = app.call("GET", "/api/auth/me", None, Some(token.as_str())).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["email"], "sana@example.com");
    assert_eq!(me.body["data"]["isVerified"], true);

    let me_by_cookie = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me_by_cookie.status, StatusCode::OK);

    let logout = app.call("POST", "/api/auth/logout", None, Some(token.as_str())).await;
    assert_eq!(logout.status, StatusCode::OK);
    assert!(cookie_pair(&logout.headers).ends_with('='));

    let after = app.call("GET", "/api/auth/me", None, Some(token.as_str())).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.body["success"], false);
}

#[tokio::test]
async fn unverified_registration_resends_a_fresh_code() {
    let app = TestApp::new(test_config()).await;
    let user_id = app.register("omar@example.com").await;

    let resend = app
        .call(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "omar@example.com", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(resend.status, StatusCode::OK);
    assert_eq!(resend.body["data"], user_id.as_str());
    assert_eq!(
        resend.body["message"],
        "Verification email resent, please check your inbox"
    );
    assert_eq!(app.state.mailer.outbox().len(), 2);

    let otp = app.latest_otp();
    let verified = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": otp.parse::<u32>().unwrap(), "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK);
}

#[tokio::test]
async fn expired_codes_are_rejected() {
    let app = TestApp::new(test_config()).await;
    let user_id = app.register("late@example.com").await;
    let otp = app.latest_otp();

    let mut user = app
        .state
        .store
        .find_user_by_id(&user_id)
        .await
        .unwrap()
        .unwrap();
    user.verification_code_expiry = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    app.state.store.update_user(&user).await.unwrap();

    let reply = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": otp, "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Otp is expired"));

    let missing = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "userId": user_id })),
            None,
        )
        .await;
    assert_eq!(missing.body["message"], "OTP and User ID are required");

    let unknown = app
        .call(
            "POST",
            "/api/auth/verify-email",
            Some(json!({ "otp": otp, "userId": "no-such-user" })),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body["message"], "Invalid request");
}

#[tokio::test]
async fn registration_rejects_bad_input() {
    let app = TestApp::new(test_config()).await;

    let bad_email = app
        .call(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "not-an-email", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_email.body["message"], "Invalid email format");

    let short = app
        .call(
            "POST",
            "/api/auth/register",
            Some(json!({ "email": "ok@example.com", "password": "  abc  " })),
            None,
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        short.body["message"],
        "Password must be at least 6 characters long"
    );

    let malformed = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header("content-type", "application/json")
                .body(Body::from("{\"email\":"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.body["message"], "Invalid request body");
    assert!(app.state.mailer.outbox().is_empty());
}

#[tokio::test]
async fn password_reset_rotates_credentials_and_revokes_sessions() {
    let app = TestApp::new(test_config()).await;
    app.verified_user("hina@example.com").await;
    let old_token = app.token_for("hina@example.com").await;

    let unknown = app
        .call(
            "POST",
            "/api/auth/forgot-password",
            Some(json!({ "email": "ghost@example.com" })),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown.body["message"], "User not found with this email");

    let requested = app
        .call(
            "POST",
            "/api/auth/forgot-password",
            Some(json!({ "email": "hina@example.com" })),
            None,
        )
        .await;
    assert_eq!(requested.status, StatusCode::OK);
    let reset_token = app.latest_reset_token();
    assert_eq!(reset_token.len(), 64);
    assert!(app
        .outbox_html()
        .contains(&format!("http://localhost:3000/reset-password/{reset_token}")));

    let short = app
        .call(
            "POST",
            "/api/auth/reset-password",
            Some(json!({ "resetToken": reset_token, "newPassword": "abc" })),
            None,
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let forged = app
        .call(
            "POST",
            "/api/auth/reset-password",
            Some(json!({ "resetToken": "deadbeef", "newPassword": "brand-new-pass" })),
            None,
        )
        .await;
    assert_eq!(forged.body["message"], "Unauthorized request");

    let reset = app
        .call(
            "POST",
            "/api/auth/reset-password",
            Some(json!({ "resetToken": reset_token, "newPassword": "brand-new-pass" })),
            None,
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK);
    assert_eq!(reset.body["message"], "Password reset successfully");

    let reused = app
        .call(
            "POST",
            "/api/auth/reset-password",
            Some(json!({ "resetToken": reset_token, "newPassword": "another-pass" })),
            None,
        )
        .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);

    let stale = app.call("GET", "/api/auth/me", None, Some(old_token.as_str())).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.login("hina@example.com", PASSWORD).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login("hina@example.com", "brand-new-pass").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn profile_routes_enforce_ownership() {
    let app = TestApp::new(test_config()).await;
    let owner_id = app.verified_user("owner@example.com").await;
    let other_id = app.verified_user("other@example.com").await;
    let owner = app.token_for("owner@example.com").await;
    let other = app.token_for("other@example.com").await;
    let path = format!("/api/profile/{owner_id}");

    let anonymous = app.call("GET", &path, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let foreign = app.call("GET", &path, None, Some(other.as_str())).await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let own = app.call("GET", &path, None, Some(owner.as_str())).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["data"]["id"], owner_id.as_str());
    assert_eq!(own.body["data"]["email"], "owner@example.com");
    assert!(own.body["data"].get("role").is_none());

    let updated = app
        .call(
            "PATCH",
            &path,
            Some(json!({
                "username": "Trail Owner",
                "gender": "female",
                "dob": "1990-02-14",
                "role": "admin",
                "isVerified": false
            })),
            Some(owner.as_str()),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["data"]["username"], "trail owner");
    assert_eq!(updated.body["data"]["gender"], "female");
    assert_eq!(updated.body["data"]["dob"], "1990-02-14");
    assert_eq!(updated.body["data"]["role"], "user");
    assert_eq!(updated.body["data"]["isVerified"], true);

    let future_dob = app
        .call(
            "PATCH",
            &path,
            Some(json!({ "dob": "2999-01-01" })),
            Some(owner.as_str()),
        )
        .await;
    assert_eq!(future_dob.status, StatusCode::BAD_REQUEST);

    let mut admin = app
        .state
        .store
        .find_user_by_id(&other_id)
        .await
        .unwrap()
        .unwrap();
    admin.role = Role::Admin;
    app.state.store.update_user(&admin).await.unwrap();

    let as_admin = app.call("GET", &path, None, Some(other.as_str())).await;
    assert_eq!(as_admin.status, StatusCode::OK);
    assert_eq!(as_admin.body["data"]["username"], "trail owner");
}

#[tokio::test]
async fn trip_generation_stores_extracted_itinerary() {
    let app = app_with_model(MODEL_REPLY).await;
    let user_id = app.verified_user("planner@example.com").await;
    let token = app.token_for("planner@example.com").await;

    let empty = app
        .call("GET", &format!("/api/trips/{user_id}"), None, Some(token.as_str()))
        .await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.body["data"], json!([]));

    let generated = app
        .call(
            "POST",
            &format!("/api/trips/generate/{user_id}"),
            Some(trip_form()),
            Some(token.as_str()),
        )
        .await;
    assert_eq!(generated.status, StatusCode::CREATED, "{}", generated.body);
    let trip = &generated.body["data"];
    assert_eq!(trip["userId"], user_id.as_str());
    assert_eq!(trip["dietaryRestrictions"], json!(["halal"]));
    assert_eq!(trip["aiSuggestions"].as_array().unwrap().len(), 2);
    assert_eq!(
        trip["aiSuggestions"][0]["activities"][0]["timeOfDay"],
        "Morning Activity"
    );
    assert_eq!(
        trip["aiSuggestions"][0]["activities"][0]["title"],
        "Drive to Naran"
    );
    assert_eq!(
        trip["aiSuggestions"][1]["activities"][1]["timeOfDay"],
        "Evening Activity"
    );
    assert!(trip["aiSuggestedNotes"]
        .as_str()
        .unwrap()
        .starts_with("Roads can close"));

    let listed = app
        .call("GET", &format!("/api/trips/{user_id}"), None, Some(token.as_str()))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["data"].as_array().unwrap().len(), 1);
    assert_eq!(listed.body["data"][0]["id"], trip["id"]);

    let health = app.call("GET", "/health", None, None).await;
    assert_eq!(health.body["metrics"]["itinerariesGeneratedTotal"], 1);
}

#[tokio::test]
async fn trip_generation_validates_before_calling_the_model() {
    let app = app_with_model(MODEL_REPLY).await;
    let user_id = app.verified_user("strict@example.com").await;
    let token = app.token_for("strict@example.com").await;
    let uri = format!("/api/trips/generate/{user_id}");

    let mut too_long = trip_form();
    too_long["duration"] = json!(9);
    let reply = app.call("POST", &uri, Some(too_long), Some(token.as_str())).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Please enter correct duration");

    let mut nowhere = trip_form();
    nowhere["destinations"] = json!([]);
    let reply = app.call("POST", &uri, Some(nowhere), Some(token.as_str())).await;
    assert_eq!(reply.body["message"], "Please enter at least one destination");

    let other = app.verified_user("intruder@example.com").await;
    let intruder = app.token_for("intruder@example.com").await;
    let reply = app.call("POST", &uri, Some(trip_form()), Some(intruder.as_str())).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_ne!(other, user_id);
}

#[tokio::test]
async fn unreadable_model_output_is_a_bad_gateway() {
    let app = app_with_model("Sorry, I cannot help with that request.").await;
    let user_id = app.verified_user("unlucky@example.com").await;
    let token = app.token_for("unlucky@example.com").await;

    let reply = app
        .call(
            "POST",
            &format!("/api/trips/generate/{user_id}"),
            Some(trip_form()),
            Some(token.as_str()),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        reply.body["message"],
        "Failed to generate itinerary. Something went wrong"
    );

    let listed = app
        .call("GET", &format!("/api/trips/{user_id}"), None, Some(token.as_str()))
        .await;
    assert_eq!(listed.body["data"], json!([]));
}

#[tokio::test]
async fn generation_without_model_is_unavailable() {
    let app = TestApp::new(test_config()).await;
    let user_id = app.verified_user("offline@example.com").await;
    let token = app.token_for("offline@example.com").await;

    let reply = app
        .call(
            "POST",
            &format!("/api/trips/generate/{user_id}"),
            Some(trip_form()),
            Some(token.as_str()),
        )
        .await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn cookie_state_changes_require_allowed_origin() {
    let app = TestApp::new(test_config()).await;
    app.verified_user("cookie@example.com").await;
    let login = app.login("cookie@example.com", PASSWORD).await;
    let cookie = cookie_pair(&login.headers);

    let no_origin = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("cookie", cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(no_origin.status, StatusCode::FORBIDDEN);

    let foreign = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("cookie", cookie.clone())
                .header("origin", "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let allowed = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("cookie", cookie)
                .header("origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
}

#[tokio::test]
async fn auth_endpoints_are_rate_limited_per_ip() {
    let app = TestApp::new(ApiConfig {
        auth_rate_limit: RateLimitSettings {
            window: Duration::from_secs(60),
            max_requests: 2,
        },
        ..test_config()
    })
    .await;

    for _ in 0..2 {
        let reply = app.login("nobody@example.com", PASSWORD).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }
    let limited = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers.get("retry-after").is_some());

    let health = app.call("GET", "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[tokio::test]
async fn google_sign_in_reports_configuration_and_state_errors() {
    let unconfigured = TestApp::new(test_config()).await;
    let reply = unconfigured
        .call("GET", "/api/auth/google/start", None, None)
        .await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);

    let app = TestApp::new(ApiConfig {
        google_oauth: Some(google_config(
            GOOGLE_TOKEN_URL.to_string(),
            GOOGLE_USERINFO_URL.to_string(),
        )),
        ..test_config()
    })
    .await;

    let start = app
        .call("GET", "/api/auth/google/start?returnTo=/trips", None, None)
        .await;
    assert_eq!(start.status, StatusCode::OK);
    let url = start.body["data"]["authorizeUrl"].as_str().unwrap();
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?client_id=client-123"));
    assert!(url.contains("code_challenge_method=S256"));

    let callback = app
        .call(
            "GET",
            "/api/auth/google/callback?code=abc&state=forged",
            None,
            None,
        )
        .await;
    assert!(callback.status.is_redirection());
    let location = callback.headers.get("location").unwrap().to_str().unwrap();
    assert_eq!(
        location,
        "http://localhost:3000/?auth=error&reason=invalid_state"
    );
}

#[tokio::test]
async fn google_sign_in_verifies_existing_and_creates_new_accounts() {
    let google = spawn_google().await;
    let app = TestApp::new(ApiConfig {
        google_oauth: Some(google_config(
            format!("{google}/token"),
            format!("{google}/userinfo"),
        )),
        ..test_config()
    })
    .await;

    let pending_id = app.register("zara@example.com").await;
    let callback = google_round_trip(&app, "zara").await;
    assert!(callback.status.is_redirection());
    assert_eq!(
        callback.headers.get("location").unwrap().to_str().unwrap(),
        "http://localhost:3000/trips?auth=success"
    );
    let cookie = cookie_pair(&callback.headers);
    assert!(cookie.starts_with("safarai_session="));

    let zara = app
        .state
        .store
        .find_user_by_email("zara@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(zara.id, pending_id);
    assert!(zara.is_verified);
    assert!(zara.verification_code.is_none());

    let me = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["id"], pending_id.as_str());

    let callback = google_round_trip(&app, "newcomer").await;
    assert_eq!(
        callback.headers.get("location").unwrap().to_str().unwrap(),
        "http://localhost:3000/trips?auth=success"
    );
    let newcomer = app
        .state
        .store
        .find_user_by_email("newcomer@example.com")
        .await
        .unwrap()
        .expect("google sign-in should create the account");
    assert!(newcomer.is_verified);
    assert_eq!(newcomer.username, "newcomer");
    assert_eq!(newcomer.role, Role::User);

    let replayed = app
        .call(
            "GET",
            "/api/auth/google/callback?code=newcomer&state=already-used",
            None,
            None,
        )
        .await;
    assert!(replayed
        .headers
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .ends_with("reason=invalid_state"));
}

#[tokio::test]
async fn expired_reset_tokens_are_rejected() {
    let app = TestApp::new(test_config()).await;
    let user_id = app.verified_user("slow@example.com").await;

    let requested = app
        .call(
            "POST",
            "/api/auth/forgot-password",
            Some(json!({ "email": "slow@example.com" })),
            None,
        )
        .await;
    assert_eq!(requested.status, StatusCode::OK);
    let reset_token = app.latest_reset_token();

    let mut user = app
        .state
        .store
        .find_user_by_id(&user_id)
        .await
        .unwrap()
        .unwrap();
    user.reset_password_expiry = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    app.state.store.update_user(&user).await.unwrap();

    let reply = app
        .call(
            "POST",
            "/api/auth/reset-password",
            Some(json!({ "resetToken": reset_token, "newPassword": "brand-new-pass" })),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid or expired token");

    assert_eq!(
        app.login("slow@example.com", PASSWORD).await.status,
        StatusCode::OK
    );
}
