use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;

use guild_client::jobs::{list_jobs, post_job};
use guild_client::suggest::assemble;
use guild_client::{ConnectionCache, GraphService, HttpStore, RecordStore, StoreError};
use guild_common::jobs::NewJob;
use guild_common::{Profile, UserId};
use guild_server::{router, State};

fn spawn_server(name: &str) -> String {
    let data_dir = std::env::temp_dir().join(format!("guild-e2e-{name}"));
    let _ = std::fs::remove_dir_all(&data_dir);
    let state = State::new(&data_dir).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router(state).into_make_service())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

fn profile(name: &str) -> Profile {
    Profile {
        display_name: name.to_string(),
        headline: format!("{name} the engineer"),
        profile_image: format!("{name}.png"),
    }
}

async fn eventually(mut probe: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if probe() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn request_lifecycle_over_http() {
    let base = spawn_server("lifecycle");
    let store = HttpStore::new(Client::new(), &base);

    let ada = UserId::new("ada");
    let grace = UserId::new("grace");
    let alan = UserId::new("alan");
    for (id, name) in [(&ada, "ada"), (&grace, "grace"), (&alan, "alan")] {
        store.create_user(id, &profile(name)).await.unwrap();
    }

    let cache = ConnectionCache::sign_in(store.clone(), ada.clone())
        .await
        .unwrap();
    let graph = GraphService::new(store.clone());

    graph.send_request(&ada, &grace).await.unwrap();
    let sender = store.get(&ada).await.unwrap();
    let recipient = store.get(&grace).await.unwrap();
    assert!(sender.has_sent_to(&grace));
    assert!(recipient.has_pending_from(&ada));

    graph.accept_request(&ada, &grace).await.unwrap();
    let a = store.get(&ada).await.unwrap();
    let g = store.get(&grace).await.unwrap();
    assert!(a.is_connected_to(&grace));
    assert!(g.is_connected_to(&ada));
    assert!(g.pending_requests.is_empty());

    // the long-poll push channel delivers the new edge without a refresh
    assert!(eventually(|| cache.connection_count() == 1).await);
    assert_eq!(cache.connections(), vec![grace.clone()]);

    // directory projection over the live records
    let mut directory = Vec::new();
    for id in store.list_ids().await.unwrap() {
        directory.push(store.get(&id).await.unwrap());
    }
    let listing = assemble(&a, &directory);
    assert_eq!(listing.connections.len(), 1);
    assert_eq!(listing.connections[0].id, grace);
    assert_eq!(listing.people_you_may_know.len(), 1);
    assert_eq!(listing.people_you_may_know[0].card.id, alan);
    assert!(!listing.people_you_may_know[0].request_sent);

    graph.remove_connection(&ada, &grace).await.unwrap();
    assert!(!store.get(&ada).await.unwrap().is_connected_to(&grace));
    assert!(!store.get(&grace).await.unwrap().is_connected_to(&ada));
    assert!(eventually(|| cache.connection_count() == 0).await);

    cache.sign_out();
}

#[tokio::test]
async fn missing_records_surface_as_not_found() {
    let base = spawn_server("not-found");
    let store = HttpStore::new(Client::new(), &base);

    let nobody = UserId::new("nobody");
    match store.get(&nobody).await {
        Err(StoreError::NotFound(id)) => assert_eq!(id, nobody),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn job_board_pages_through_postings() {
    let base = spawn_server("jobs");
    let client = Client::new();

    for (title, company) in [
        ("Systems Engineer", "Initech"),
        ("Staff Engineer", "Hooli"),
        ("Compiler Engineer", "Initech"),
    ] {
        post_job(
            &client,
            &base,
            &NewJob {
                title: title.to_string(),
                company: company.to_string(),
                location: "Remote".to_string(),
                description: String::new(),
            },
        )
        .await
        .unwrap();
    }

    let page = list_jobs(&client, &base, 0, 2, None).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_next);

    let rest = list_jobs(&client, &base, 2, 2, None).await.unwrap();
    assert_eq!(rest.items.len(), 1);
    assert!(!rest.has_next);

    let filtered = list_jobs(&client, &base, 0, 10, Some("initech")).await.unwrap();
    assert_eq!(filtered.total, 2);
    assert!(filtered
        .items
        .iter()
        .all(|job| job.company == "Initech"));
}
