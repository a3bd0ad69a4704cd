//! End-to-end runner behavior: expectations, teardown, ordering, fail-fast,
//! and the unresolved-variable guard.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use apiqa_core::{
    Action, ExpectKind, Expectation, Request, Scenario, Step, TestSuite,
};
use apiqa_runner::{CancelToken, Runner};

use common::{TestServer, read_body, respond_json, respond_status};

fn request(method: &str, url: String) -> Request {
    Request {
        method: method.into(),
        url,
        headers: HashMap::new(),
        body: None,
        timeout_ms: 2000,
    }
}

fn expect_status(code: i64) -> Expectation {
    Expectation {
        kind: ExpectKind::Status,
        target: Some("code".into()),
        value: Some(serde_json::Value::from(code)),
    }
}

fn expect_field(target: &str, value: &str) -> Expectation {
    Expectation {
        kind: ExpectKind::JsonPath,
        target: Some(target.into()),
        value: Some(serde_json::Value::from(value)),
    }
}

fn scenario(name: &str, steps: Vec<Step>, teardown: Vec<Action>) -> Scenario {
    Scenario {
        name: name.into(),
        env: None,
        tags: Vec::new(),
        setup: Vec::new(),
        steps,
        teardown,
    }
}

/// Server with /users (echoes the posted email), /fail (always 200),
/// /cleanup (counts POSTs), and /ok.
fn users_server(cleanup: Arc<AtomicUsize>) -> TestServer {
    TestServer::spawn(2, move |mut req| {
        let url = req.url().to_string();
        match url.as_str() {
            "/users" => {
                let body = read_body(&mut req);
                let parsed: serde_json::Value =
                    serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
                let email = parsed["email"].as_str().unwrap_or("").to_string();
                let name = parsed["name"].as_str().unwrap_or("").to_string();
                respond_json(
                    req,
                    201,
                    &serde_json::json!({"id": "u-123", "email": email, "name": name})
                        .to_string(),
                );
            }
            "/fail" => respond_json(req, 200, r#"{"ok":true}"#),
            "/cleanup" => {
                cleanup.fetch_add(1, Ordering::SeqCst);
                respond_status(req, 204);
            }
            _ => respond_status(req, 200),
        }
    })
}

#[test]
fn status_and_json_field_with_uuid_and_teardown() {
    let cleanup = Arc::new(AtomicUsize::new(0));
    let srv = users_server(Arc::clone(&cleanup));

    let mut req = request("POST", format!("{}/users", srv.base_url));
    req.headers
        .insert("Content-Type".into(), "application/json".into());
    req.body = Some(serde_json::json!({
        "email": "qa+${uuid}@example.com",
        "name": "Test User"
    }));

    let suite = TestSuite {
        name: "Users API".into(),
        openapi: None,
        scenarios: vec![scenario(
            "Create user 201, field matches, teardown runs",
            vec![Step {
                name: None,
                request: req,
                expect: vec![
                    expect_status(201),
                    expect_field("$.email", "qa+${uuid}@example.com"),
                ],
                hooks: Vec::new(),
            }],
            vec![Action {
                name: Some("cleanup".into()),
                request: Some(request("POST", format!("{}/cleanup", srv.base_url))),
            }],
        )],
    };

    let runner = Runner::new().unwrap();
    let res = runner.run_suite(&CancelToken::new(), &suite);

    assert!(res.passed, "suite should pass: {res:#?}");
    assert!(res.scenarios[0].teardown_ran);
    assert_eq!(cleanup.load(Ordering::SeqCst), 1);
    let step = &res.scenarios[0].steps[0];
    assert_eq!(step.status_code, 201);
    assert!(step.req_body.contains("@example.com"));
}

#[test]
fn teardown_runs_on_failure_and_scenarios_are_isolated() {
    let cleanup = Arc::new(AtomicUsize::new(0));
    let srv = users_server(Arc::clone(&cleanup));

    let failing = scenario(
        "fails expectations",
        vec![Step {
            name: None,
            request: request("POST", format!("{}/fail", srv.base_url)),
            expect: vec![expect_status(418)],
            hooks: Vec::new(),
        }],
        vec![Action {
            name: None,
            request: Some(request("POST", format!("{}/cleanup", srv.base_url))),
        }],
    );
    let mut post = request("POST", format!("{}/users", srv.base_url));
    post.headers
        .insert("Content-Type".into(), "application/json".into());
    post.body = Some(serde_json::json!({"email": "qa+${uuid}@example.com", "name": "Other"}));
    let passing = scenario(
        "passes and also tears down",
        vec![Step {
            name: None,
            request: post,
            expect: vec![
                expect_status(201),
                expect_field("$.email", "qa+${uuid}@example.com"),
            ],
            hooks: Vec::new(),
        }],
        vec![Action {
            name: None,
            request: Some(request("POST", format!("{}/cleanup", srv.base_url))),
        }],
    );

    let suite = TestSuite {
        name: "failure still tears down".into(),
        openapi: None,
        scenarios: vec![failing, passing],
    };

    let res = Runner::new().unwrap().run_suite(&CancelToken::new(), &suite);

    assert!(!res.passed, "one scenario fails");
    assert_eq!(cleanup.load(Ordering::SeqCst), 2, "both teardowns ran");

    let passed = res.scenarios.iter().filter(|sc| sc.passed).count();
    let failed = res.scenarios.iter().filter(|sc| !sc.passed).count();
    assert_eq!((passed, failed), (1, 1));
    assert!(res.scenarios.iter().all(|sc| sc.teardown_ran));
}

#[test]
fn unresolved_url_guard_blocks_dispatch() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in = Arc::clone(&hits);
    let srv = TestServer::spawn(1, move |req| {
        hits_in.fetch_add(1, Ordering::SeqCst);
        respond_status(req, 200);
    });

    let suite = TestSuite {
        name: "guard".into(),
        openapi: None,
        scenarios: vec![scenario(
            "unresolved",
            vec![Step {
                name: None,
                request: request("GET", format!("{}/items/${{UNDEFINED}}", srv.base_url)),
                expect: vec![expect_status(200)],
                hooks: Vec::new(),
            }],
            Vec::new(),
        )],
    };

    let res = Runner::new().unwrap().run_suite(&CancelToken::new(), &suite);

    assert!(!res.passed);
    let step = &res.scenarios[0].steps[0];
    assert_eq!(step.errors.len(), 1, "exactly one error: {:?}", step.errors);
    assert!(step.errors[0].contains("${UNDEFINED}"));
    assert!(step.errors[0].contains("--env"));
    assert_eq!(hits.load(Ordering::SeqCst), 0, "no HTTP call may be made");
}

#[test]
fn result_order_matches_declaration_at_any_parallelism() {
    let srv = TestServer::spawn(4, |req| respond_status(req, 200));

    let names = ["s0", "s1", "s2", "s3"];
    let scenarios: Vec<Scenario> = names
        .iter()
        .map(|n| {
            scenario(
                n,
                vec![Step {
                    name: None,
                    request: request("GET", format!("{}/", srv.base_url)),
                    expect: vec![expect_status(200)],
                    hooks: Vec::new(),
                }],
                Vec::new(),
            )
        })
        .collect();
    let suite = TestSuite {
        name: "order".into(),
        openapi: None,
        scenarios,
    };

    for parallel in 1..=4 {
        let runner = Runner::new().unwrap().with_parallel(parallel);
        let res = runner.run_suite(&CancelToken::new(), &suite);
        assert!(res.passed);
        assert_eq!(res.scenarios.len(), names.len());
        for (i, sc) in res.scenarios.iter().enumerate() {
            assert_eq!(sc.name, names[i], "parallel={parallel}");
        }
    }
}

#[test]
fn fail_fast_truncates_to_failing_prefix() {
    let srv = TestServer::spawn(1, |req| {
        if req.url() == "/fail" {
            respond_status(req, 500);
        } else {
            respond_status(req, 200);
        }
    });

    let ok = |name: &str| {
        scenario(
            name,
            vec![Step {
                name: None,
                request: request("GET", format!("{}/", srv.base_url)),
                expect: vec![expect_status(200)],
                hooks: Vec::new(),
            }],
            Vec::new(),
        )
    };
    let bad = scenario(
        "bad",
        vec![Step {
            name: None,
            request: request("GET", format!("{}/fail", srv.base_url)),
            expect: vec![expect_status(200)],
            hooks: Vec::new(),
        }],
        Vec::new(),
    );

    let suite = TestSuite {
        name: "ff".into(),
        openapi: None,
        scenarios: vec![ok("first"), bad, ok("never-runs")],
    };

    // Fail-fast forces sequential even when parallelism was requested.
    let runner = Runner::new().unwrap().with_parallel(4).with_fail_fast(true);
    let res = runner.run_suite(&CancelToken::new(), &suite);

    assert!(!res.passed);
    assert_eq!(res.scenarios.len(), 2, "truncated to failing prefix");
    assert!(res.scenarios[0].passed);
    assert!(!res.scenarios[1].passed);
}

#[test]
fn setup_failure_marks_scenario_failed_but_steps_and_teardown_run() {
    let cleanup = Arc::new(AtomicUsize::new(0));
    let step_hits = Arc::new(AtomicUsize::new(0));
    let cleanup_in = Arc::clone(&cleanup);
    let step_hits_in = Arc::clone(&step_hits);
    let srv = TestServer::spawn(1, move |req| match req.url() {
        "/cleanup" => {
            cleanup_in.fetch_add(1, Ordering::SeqCst);
            respond_status(req, 204);
        }
        _ => {
            step_hits_in.fetch_add(1, Ordering::SeqCst);
            respond_status(req, 200);
        }
    });

    let mut sc = scenario(
        "broken setup",
        vec![Step {
            name: None,
            request: request("GET", format!("{}/ok", srv.base_url)),
            expect: vec![expect_status(200)],
            hooks: Vec::new(),
        }],
        vec![Action {
            name: None,
            request: Some(request("POST", format!("{}/cleanup", srv.base_url))),
        }],
    );
    // Port 9 is reliably closed; the setup call errors.
    let mut broken = request("GET", "http://127.0.0.1:9/".into());
    broken.timeout_ms = 300;
    sc.setup = vec![Action {
        name: Some("fixture".into()),
        request: Some(broken),
    }];

    let suite = TestSuite {
        name: "setup".into(),
        openapi: None,
        scenarios: vec![sc],
    };
    let res = Runner::new().unwrap().run_suite(&CancelToken::new(), &suite);

    assert!(!res.passed, "setup failure fails the scenario");
    assert_eq!(step_hits.load(Ordering::SeqCst), 1, "steps still run");
    assert!(res.scenarios[0].steps[0].passed, "step itself passed");
    assert!(res.scenarios[0].teardown_ran);
    assert_eq!(cleanup.load(Ordering::SeqCst), 1);
}

#[test]
fn transport_error_still_evaluates_expectations() {
    let suite = TestSuite {
        name: "transport".into(),
        openapi: None,
        scenarios: vec![scenario(
            "unreachable",
            vec![Step {
                name: None,
                request: {
                    let mut r = request("GET", "http://127.0.0.1:9/".into());
                    r.timeout_ms = 300;
                    r
                },
                expect: vec![expect_status(200)],
                hooks: Vec::new(),
            }],
            Vec::new(),
        )],
    };

    let res = Runner::new().unwrap().run_suite(&CancelToken::new(), &suite);
    let step = &res.scenarios[0].steps[0];
    assert!(!step.passed);
    assert_eq!(step.status_code, 0);
    assert!(step.errors.iter().any(|e| e.starts_with("request error:")));
    // The status expectation still ran against status 0.
    assert!(step.errors.iter().any(|e| e.contains("status: got 0")));
}
