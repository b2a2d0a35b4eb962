//! End-to-end tests for the HTTP and WebSocket surface.
//!
//! Each test spawns a fresh in-memory server on an ephemeral port and
//! drives it the way real clients would: the payment gateway with the
//! `gateway` role, members with `X-Member-Id`, admins with `X-Roles`.

#![allow(clippy::panic)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use stokvel_ledger::api;
use stokvel_ledger::app_state::AppState;
use stokvel_ledger::config::{DecayPolicy, PointsPolicy, RankingPolicy};
use stokvel_ledger::domain::{EventBus, EventRegistry, LedgerBook};
use stokvel_ledger::service::{
    AllocationCoordinator, BalanceProjector, DecayScheduler, LedgerService, RankingEngine,
};
use stokvel_ledger::ws::handler::ws_handler;

/// Starts a server with a fresh ledger and returns its base URL.
async fn spawn_server() -> String {
    let book = Arc::new(LedgerBook::new());
    let registry = Arc::new(EventRegistry::new());
    let event_bus = EventBus::new(256);
    let points = PointsPolicy::default();
    let ranking_policy = RankingPolicy::default();
    let decay_policy = DecayPolicy::default();

    let ledger = Arc::new(LedgerService::new(
        Arc::clone(&book),
        None,
        event_bus.clone(),
        points,
    ));
    let projector = Arc::new(BalanceProjector::new(
        Arc::clone(&book),
        event_bus.clone(),
        points,
    ));
    let ranking = Arc::new(RankingEngine::new(
        Arc::clone(&projector),
        event_bus.clone(),
        ranking_policy,
    ));
    let coordinator = Arc::new(AllocationCoordinator::new(
        Arc::clone(&book),
        registry,
        None,
        event_bus.clone(),
        points,
    ));
    let decay = Arc::new(DecayScheduler::new(
        book,
        Arc::clone(&ledger),
        Arc::clone(&coordinator),
        event_bus.clone(),
        decay_policy,
    ));

    let state = AppState {
        ledger,
        projector,
        ranking,
        coordinator,
        decay,
        event_bus,
        points,
        ranking_policy,
        decay_policy,
    };

    let app = axum::Router::new()
        .merge(api::build_router())
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("failed to bind test listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("test listener has no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn get_json(client: &reqwest::Client, url: &str) -> (StatusCode, Value) {
    let Ok(resp) = client.get(url).send().await else {
        panic!("GET {url} failed");
    };
    let status = resp.status();
    let Ok(body) = resp.json::<Value>().await else {
        panic!("GET {url} did not return JSON");
    };
    (status, body)
}

async fn register(client: &reqwest::Client, base: &str, member_id: Uuid, name: &str) {
    let Ok(resp) = client
        .post(format!("{base}/api/v1/members"))
        .header("x-member-id", member_id.to_string())
        .json(&json!({ "display_name": name, "monthly_target": 1000 }))
        .send()
        .await
    else {
        panic!("register request failed");
    };
    assert_eq!(resp.status(), StatusCode::CREATED);
}

async fn contribute(
    client: &reqwest::Client,
    base: &str,
    member_id: Uuid,
    amount: i64,
    reference: &str,
) -> (StatusCode, Value) {
    let Ok(resp) = client
        .post(format!("{base}/api/v1/contributions"))
        .header("x-roles", "gateway")
        .json(&json!({
            "member_id": member_id,
            "amount": amount,
            "external_reference": reference,
        }))
        .send()
        .await
    else {
        panic!("contribution request failed");
    };
    let status = resp.status();
    let Ok(body) = resp.json::<Value>().await else {
        panic!("contribution response was not JSON");
    };
    (status, body)
}

async fn create_event(client: &reqwest::Client, base: &str, capacity: u32, slot_cost: u32) -> Uuid {
    let Ok(resp) = client
        .post(format!("{base}/api/v1/events"))
        .header("x-roles", "admin")
        .json(&json!({
            "name": "Year-end gala",
            "start_at": Utc::now() + Duration::days(30),
            "capacity": capacity,
            "slot_cost": slot_cost,
        }))
        .send()
        .await
    else {
        panic!("create event request failed");
    };
    assert_eq!(resp.status(), StatusCode::CREATED);
    let Ok(body) = resp.json::<Value>().await else {
        panic!("event response was not JSON");
    };
    let Some(id) = body.pointer("/id").and_then(Value::as_str) else {
        panic!("event response has no id");
    };
    let Ok(id) = Uuid::parse_str(id) else {
        panic!("event id is not a uuid");
    };
    id
}

#[tokio::test]
async fn health_endpoint_answers_without_auth() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{base}/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.pointer("/status").and_then(Value::as_str),
        Some("healthy")
    );
    assert!(body.pointer("/version").and_then(Value::as_str).is_some());
}

#[tokio::test]
async fn points_policy_is_published() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{base}/config/points-policy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.pointer("/points_per_slot").and_then(Value::as_i64),
        Some(500)
    );
    assert_eq!(
        body.pointer("/ticket_cost_points").and_then(Value::as_i64),
        Some(495)
    );
}

#[tokio::test]
async fn registration_requires_a_forwarded_identity() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let Ok(resp) = client
        .post(format!("{base}/api/v1/members"))
        .json(&json!({ "display_name": "No Header" }))
        .send()
        .await
    else {
        panic!("register request failed");
    };
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registering_the_same_identity_twice_conflicts() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;

    let Ok(resp) = client
        .post(format!("{base}/api/v1/members"))
        .header("x-member-id", member_id.to_string())
        .json(&json!({ "display_name": "Asha Again" }))
        .send()
        .await
    else {
        panic!("register request failed");
    };
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn contribution_claim_fulfil_flow_debits_points_at_fulfilment() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;

    let (status, body) = contribute(&client, &base, member_id, 500, "eft-001").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.pointer("/new_points").and_then(Value::as_i64), Some(500));
    assert_eq!(
        body.pointer("/already_recorded").and_then(Value::as_bool),
        Some(false)
    );

    let event_id = create_event(&client, &base, 3, 1).await;

    let Ok(resp) = client
        .post(format!("{base}/api/v1/events/{event_id}/claim"))
        .header("x-member-id", member_id.to_string())
        .send()
        .await
    else {
        panic!("claim request failed");
    };
    assert_eq!(resp.status(), StatusCode::CREATED);
    let Ok(allocation) = resp.json::<Value>().await else {
        panic!("claim response was not JSON");
    };
    assert_eq!(
        allocation.pointer("/status").and_then(Value::as_str),
        Some("held")
    );

    // Holding reserves capacity but spends nothing.
    let (status, balance) =
        get_json(&client, &format!("{base}/api/v1/members/{member_id}/balance")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance.pointer("/points").and_then(Value::as_i64), Some(500));
    assert_eq!(balance.pointer("/slots").and_then(Value::as_u64), Some(1));

    let Ok(resp) = client
        .post(format!("{base}/api/v1/events/{event_id}/fulfil"))
        .header("x-roles", "admin")
        .json(&json!({ "member_id": member_id }))
        .send()
        .await
    else {
        panic!("fulfil request failed");
    };
    assert_eq!(resp.status(), StatusCode::OK);
    let Ok(fulfilled) = resp.json::<Value>().await else {
        panic!("fulfil response was not JSON");
    };
    assert_eq!(
        fulfilled.pointer("/new_points").and_then(Value::as_i64),
        Some(5)
    );
    assert_eq!(
        fulfilled
            .pointer("/allocation/status")
            .and_then(Value::as_str),
        Some("fulfilled")
    );

    let (_, balance) =
        get_json(&client, &format!("{base}/api/v1/members/{member_id}/balance")).await;
    assert_eq!(balance.pointer("/points").and_then(Value::as_i64), Some(5));
    assert_eq!(balance.pointer("/slots").and_then(Value::as_u64), Some(0));

    let (_, history) =
        get_json(&client, &format!("{base}/api/v1/members/{member_id}/ledger")).await;
    let entries = history.pointer("/data").and_then(Value::as_array);
    let Some(entries) = entries else {
        panic!("ledger history has no data array");
    };
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn contribution_replay_answers_with_the_original_entry() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;

    let (status, first) = contribute(&client, &base, member_id, 500, "eft-042").await;
    assert_eq!(status, StatusCode::CREATED);
    let first_entry_id = first.pointer("/entry/id").cloned();

    let (status, replay) = contribute(&client, &base, member_id, 500, "eft-042").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        replay.pointer("/already_recorded").and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(replay.pointer("/entry/id").cloned(), first_entry_id);
    assert_eq!(replay.pointer("/new_points").and_then(Value::as_i64), Some(500));

    let (_, balance) =
        get_json(&client, &format!("{base}/api/v1/members/{member_id}/balance")).await;
    assert_eq!(balance.pointer("/points").and_then(Value::as_i64), Some(500));
}

#[tokio::test]
async fn contributions_need_the_gateway_or_admin_role() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;

    let Ok(resp) = client
        .post(format!("{base}/api/v1/contributions"))
        .header("x-member-id", member_id.to_string())
        .json(&json!({
            "member_id": member_id,
            "amount": 500,
            "external_reference": "eft-999",
        }))
        .send()
        .await
    else {
        panic!("contribution request failed");
    };
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn concurrent_claims_never_oversell_capacity() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let members: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    for (i, member_id) in members.iter().enumerate() {
        register(&client, &base, *member_id, &format!("Member {i}")).await;
        let (status, _) =
            contribute(&client, &base, *member_id, 500, &format!("eft-c{i}")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let event_id = create_event(&client, &base, 1, 1).await;

    let mut tasks = Vec::new();
    for member_id in &members {
        let client = client.clone();
        let url = format!("{base}/api/v1/events/{event_id}/claim");
        let member_id = *member_id;
        tasks.push(tokio::spawn(async move {
            let Ok(resp) = client
                .post(url)
                .header("x-member-id", member_id.to_string())
                .send()
                .await
            else {
                panic!("claim request failed");
            };
            resp.status()
        }));
    }

    let mut held = 0;
    let mut full = 0;
    for task in tasks {
        let Ok(status) = task.await else {
            panic!("claim task failed");
        };
        if status == StatusCode::CREATED {
            held += 1;
        } else if status == StatusCode::UNPROCESSABLE_ENTITY {
            full += 1;
        }
    }
    assert_eq!(held, 1, "exactly one claim should win the last slot");
    assert_eq!(full, 3, "losers should be told the event is full");
}

#[tokio::test]
async fn leaderboard_ranks_by_points_then_earliest_qualification() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let d = Uuid::new_v4();
    register(&client, &base, a, "Asha").await;
    register(&client, &base, b, "Bongani").await;
    register(&client, &base, c, "Carla").await;
    register(&client, &base, d, "Dumi").await;

    contribute(&client, &base, a, 1000, "eft-a").await;
    contribute(&client, &base, b, 500, "eft-b").await;
    contribute(&client, &base, c, 500, "eft-c").await;
    contribute(&client, &base, d, 100, "eft-d").await;

    let (status, board) = get_json(&client, &format!("{base}/api/v1/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        board.pointer("/qualifying_count").and_then(Value::as_u64),
        Some(3)
    );
    // ceil(3 * 0.4) = 2 priority places.
    assert_eq!(
        board.pointer("/priority_threshold").and_then(Value::as_u64),
        Some(2)
    );

    let names: Vec<&str> = board
        .pointer("/rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.pointer("/display_name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(names, vec!["Asha", "Bongani", "Carla"]);

    assert_eq!(
        board.pointer("/rows/0/priority").and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(
        board.pointer("/rows/1/priority").and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(
        board.pointer("/rows/2/priority").and_then(Value::as_bool),
        Some(false)
    );

    // An explicit bar reshapes the board without touching the cached one.
    let (_, strict) =
        get_json(&client, &format!("{base}/api/v1/leaderboard?min_points=1000")).await;
    assert_eq!(
        strict.pointer("/qualifying_count").and_then(Value::as_u64),
        Some(1)
    );
}

#[tokio::test]
async fn decay_sweep_is_admin_only_and_idempotent() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;
    contribute(&client, &base, member_id, 600, "eft-600").await;

    let as_of = (Utc::now().date_naive() + Duration::days(43)).to_string();

    let Ok(resp) = client
        .post(format!("{base}/api/v1/decay/run"))
        .json(&json!({ "as_of": as_of }))
        .send()
        .await
    else {
        panic!("decay request failed");
    };
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let Ok(resp) = client
        .post(format!("{base}/api/v1/decay/run"))
        .header("x-roles", "admin")
        .json(&json!({ "as_of": as_of }))
        .send()
        .await
    else {
        panic!("decay request failed");
    };
    assert_eq!(resp.status(), StatusCode::OK);
    let Ok(report) = resp.json::<Value>().await else {
        panic!("decay response was not JSON");
    };
    // Grace ends at day 40; days 41 to 43 each cost 15 points.
    assert_eq!(
        report.pointer("/penalties_applied").and_then(Value::as_u64),
        Some(3)
    );
    assert_eq!(
        report.pointer("/penalty_points").and_then(Value::as_i64),
        Some(45)
    );

    let Ok(resp) = client
        .post(format!("{base}/api/v1/decay/run"))
        .header("x-roles", "admin")
        .json(&json!({ "as_of": as_of }))
        .send()
        .await
    else {
        panic!("decay request failed");
    };
    let Ok(rerun) = resp.json::<Value>().await else {
        panic!("decay response was not JSON");
    };
    assert_eq!(
        rerun.pointer("/penalties_applied").and_then(Value::as_u64),
        Some(0)
    );
    assert_eq!(
        rerun.pointer("/skipped_existing").and_then(Value::as_u64),
        Some(3)
    );

    let (_, balance) =
        get_json(&client, &format!("{base}/api/v1/members/{member_id}/balance")).await;
    assert_eq!(balance.pointer("/points").and_then(Value::as_i64), Some(555));
}

#[tokio::test]
async fn completed_events_refuse_further_transitions() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let event_id = create_event(&client, &base, 5, 1).await;

    for target in ["closed", "completed"] {
        let Ok(resp) = client
            .post(format!("{base}/api/v1/events/{event_id}/status"))
            .header("x-roles", "admin")
            .json(&json!({ "status": target }))
            .send()
            .await
        else {
            panic!("status request failed");
        };
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let Ok(resp) = client
        .post(format!("{base}/api/v1/events/{event_id}/status"))
        .header("x-roles", "admin")
        .json(&json!({ "status": "open" }))
        .send()
        .await
    else {
        panic!("status request failed");
    };
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_member_balance_is_not_found() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let (status, _) = get_json(
        &client,
        &format!("{base}/api/v1/members/{}/balance", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn next_ws_json(socket: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Value {
    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next()).await;
    let Ok(Some(Ok(Message::Text(text)))) = frame else {
        panic!("expected a text frame from the server");
    };
    let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
        panic!("frame was not JSON");
    };
    value
}

#[tokio::test]
async fn websocket_wildcard_subscribers_see_ledger_appends() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;

    let ws_url = format!("ws{}/ws", base.trim_start_matches("http"));
    let Ok((mut socket, _)) = connect_async(ws_url.as_str()).await else {
        panic!("ws connect failed");
    };

    let subscribe = json!({
        "id": "sub-1",
        "type": "command",
        "timestamp": Utc::now(),
        "payload": { "command": "subscribe", "member_ids": ["*"] }
    });
    let sent = socket.send(Message::text(subscribe.to_string())).await;
    assert!(sent.is_ok());

    let ack = next_ws_json(&mut socket).await;
    assert_eq!(ack.pointer("/type").and_then(Value::as_str), Some("response"));
    assert_eq!(ack.pointer("/id").and_then(Value::as_str), Some("sub-1"));
    assert_eq!(
        ack.pointer("/payload/wildcard").and_then(Value::as_bool),
        Some(true)
    );

    let (status, _) = contribute(&client, &base, member_id, 500, "eft-ws").await;
    assert_eq!(status, StatusCode::CREATED);

    // The bus may deliver other envelopes first; scan for the append.
    let mut seen_append = false;
    for _ in 0..5 {
        let msg = next_ws_json(&mut socket).await;
        if msg.pointer("/payload/event_type").and_then(Value::as_str) == Some("entry_appended") {
            assert_eq!(msg.pointer("/type").and_then(Value::as_str), Some("event"));
            assert_eq!(
                msg.pointer("/payload/member_id").and_then(Value::as_str),
                Some(member_id.to_string().as_str())
            );
            assert_eq!(
                msg.pointer("/payload/new_points").and_then(Value::as_i64),
                Some(500)
            );
            seen_append = true;
            break;
        }
    }
    assert!(seen_append, "entry_appended never reached the subscriber");
}

#[tokio::test]
async fn websocket_balance_reads_answer_over_the_socket() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let member_id = Uuid::new_v4();
    register(&client, &base, member_id, "Asha").await;
    contribute(&client, &base, member_id, 1200, "eft-1200").await;

    let ws_url = format!("ws{}/ws", base.trim_start_matches("http"));
    let Ok((mut socket, _)) = connect_async(ws_url.as_str()).await else {
        panic!("ws connect failed");
    };

    let command = json!({
        "id": "bal-1",
        "type": "command",
        "timestamp": Utc::now(),
        "payload": { "command": "get_balance", "member_id": member_id }
    });
    let sent = socket.send(Message::text(command.to_string())).await;
    assert!(sent.is_ok());

    let reply = next_ws_json(&mut socket).await;
    assert_eq!(
        reply.pointer("/type").and_then(Value::as_str),
        Some("response")
    );
    assert_eq!(
        reply.pointer("/payload/points").and_then(Value::as_i64),
        Some(1200)
    );
    assert_eq!(
        reply.pointer("/payload/slots").and_then(Value::as_u64),
        Some(2)
    );
}
