//! End-to-end tests for the list and kill operations

mod common;

use common::{sample_fleet, MockProcess, MockService};
use pidwatch_daemon::config::Config;
use pidwatch_daemon::error::Error;
use pidwatch_daemon::filter::SystemUsers;
use pidwatch_daemon::memory::{MemoryResolver, ResidentSetSize, UniqueSetSize};
use pidwatch_daemon::protocol::{LimitArg, ListProcessesParams};
use pidwatch_daemon::record::{NameSource, Normalizer};
use pidwatch_daemon::socket::handle_connection;
use pidwatch_daemon::tools::ProcessTools;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn tools_for(service: &Arc<MockService>) -> ProcessTools<MockService> {
    let mut config = Config::default();
    config.sampling.memory_settle_ms = 10;
    config.termination.timeout_secs = 1;
    config.termination.poll_interval_ms = 10;
    let memory = MemoryResolver::new(vec![Box::new(UniqueSetSize), Box::new(ResidentSetSize)]);
    let normalizer = Normalizer::new(Arc::new(memory), NameSource::ProcessName);
    ProcessTools::new(Arc::clone(service), normalizer, SystemUsers::from_names(["root"]), &config)
}

fn memory_params() -> ListProcessesParams {
    ListProcessesParams {
        sort_by: Some("memory".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_invalid_sort_fails_before_sampling() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = tools_for(&service);
    let params = ListProcessesParams {
        sort_by: Some("invalid".to_string()),
        duration: Some(5),
        ..Default::default()
    };

    let started = Instant::now();
    let err = tools.list_processes(params).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(service.enumerations(), 0);
}

#[tokio::test]
async fn test_non_numeric_limit_fails_before_sampling() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = tools_for(&service);
    let params = ListProcessesParams {
        limit: Some(LimitArg::Text("lots".to_string())),
        ..Default::default()
    };
    let err = tools.list_processes(params).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(service.enumerations(), 0);
}

#[tokio::test]
async fn test_list_by_memory_skips_long_window() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = tools_for(&service);
    let params = ListProcessesParams { duration: Some(30), ..memory_params() };

    let started = Instant::now();
    let records = tools.list_processes(params).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.enumerations(), 2);

    let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![300, 200, 201, 202]);
}

#[tokio::test]
async fn test_list_by_cpu_measures_the_window() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = Arc::new(tools_for(&service));
    let params = ListProcessesParams { duration: Some(1), ..Default::default() };

    let worker = {
        let tools = Arc::clone(&tools);
        tokio::spawn(async move { tools.list_processes(params).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    service.get(300).add_cpu(500);
    service.get(201).add_cpu(100);

    let records = worker.await.unwrap().unwrap();
    assert_eq!(records[0].pid, 300);
    assert_eq!(records[1].pid, 201);
    assert!(records[0].cpu_percent > records[1].cpu_percent);
    assert!(records[0].cpu_percent <= 50.0);
    assert!(records.windows(2).all(|w| w[0].cpu_percent >= w[1].cpu_percent));
}

#[tokio::test]
async fn test_vanished_process_yields_one_degraded_record() {
    let service = Arc::new(MockService::new(sample_fleet()));
    service.get(201).vanish();
    let tools = tools_for(&service);

    let records = tools
        .list_processes(ListProcessesParams { include_system: Some(true), ..memory_params() })
        .await
        .unwrap();
    assert_eq!(records.len(), 6);
    let matching: Vec<_> = records.iter().filter(|r| r.pid == 201).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].name, "<terminated>");
    assert_eq!(matching[0].username, "<unknown>");
    assert_eq!(matching[0].status, "<terminated>");
    assert_eq!(matching[0].cpu_percent, 0.0);
    assert_eq!(matching[0].rss, 0);
}

#[tokio::test]
async fn test_filters_compose() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = tools_for(&service);
    let params = ListProcessesParams {
        name_filter: Some("chrome".to_string()),
        user_filter: Some("BOB".to_string()),
        status_filter: Some("running".to_string()),
        ..memory_params()
    };
    let records = tools.list_processes(params).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "CHROME");
}

#[tokio::test]
async fn test_limit_string_is_applied_after_sort() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = tools_for(&service);
    let params = ListProcessesParams {
        limit: Some(LimitArg::Text("2".to_string())),
        sort_asc: Some(true),
        ..memory_params()
    };
    let records = tools.list_processes(params).await.unwrap();
    let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![202, 201]);
}

#[tokio::test]
async fn test_concurrent_lists_are_independent() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let tools = Arc::new(tools_for(&service));
    let a = {
        let tools = Arc::clone(&tools);
        tokio::spawn(async move { tools.list_processes(memory_params()).await })
    };
    let b = {
        let tools = Arc::clone(&tools);
        tokio::spawn(async move { tools.list_processes(memory_params()).await })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a, b);
    assert_eq!(service.enumerations(), 4);
}

#[tokio::test]
async fn test_kill_process_messages() {
    let service = Arc::new(MockService::new(vec![MockProcess::new(300, "firefox", "bob")]));
    let tools = tools_for(&service);

    assert_eq!(tools.kill_process(300).await.to_string(), "Process 300 terminated");
    assert_eq!(
        tools.kill_process(300).await.to_string(),
        "Failed to kill 300: process not found (pid=300)"
    );
    let own = tools.kill_process(std::process::id()).await;
    assert!(own.to_string().starts_with("Refusing to kill"));
}

async fn roundtrip(lines: &[&str], service: Arc<MockService>) -> Vec<Value> {
    let tools = Arc::new(tools_for(&service));
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let server_task = tokio::spawn(handle_connection(server_read, server_write, tools));

    let (client_read, mut client_write) = tokio::io::split(client);
    for line in lines {
        client_write.write_all(line.as_bytes()).await.unwrap();
        client_write.write_all(b"\n").await.unwrap();
    }
    client_write.shutdown().await.unwrap();

    let mut reader = BufReader::new(client_read).lines();
    let mut responses = Vec::new();
    while let Some(line) = reader.next_line().await.unwrap() {
        responses.push(serde_json::from_str(&line).unwrap());
    }
    server_task.await.unwrap();
    responses
}

fn response_with_id<'a>(responses: &'a [Value], id: &str) -> &'a Value {
    responses.iter().find(|r| r["id"] == id).unwrap()
}

#[tokio::test]
async fn test_protocol_roundtrip() {
    let service = Arc::new(MockService::new(sample_fleet()));
    let responses = roundtrip(
        &[
            r#"{"cmd":"ping"}"#,
            r#"{"cmd":"list_processes","id":"a","params":{"sort_by":"memory","limit":"2"}}"#,
            r#"{"cmd":"list_processes","id":"b","params":{"sort_by":"invalid"}}"#,
            "not json",
            r#"{"cmd":"kill_process","id":"c","params":{"pid":202}}"#,
        ],
        Arc::clone(&service),
    )
    .await;

    // Requests run concurrently, so responses are matched by id.
    assert_eq!(responses.len(), 5);
    assert_eq!(responses.iter().filter(|r| r["type"] == "pong").count(), 1);

    let data = response_with_id(&responses, "a")["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["pid"], 300);
    assert_eq!(data[0]["name"], "firefox");
    assert_eq!(data[1]["pid"], 200);

    let invalid = response_with_id(&responses, "b");
    assert!(invalid["data"]["error"].as_str().unwrap().contains("sort_by"));

    let unparsed: Vec<_> = responses
        .iter()
        .filter(|r| r["type"] == "response" && r["id"].is_null())
        .collect();
    assert_eq!(unparsed.len(), 1);
    assert!(unparsed[0]["data"]["error"].is_string());

    assert_eq!(response_with_id(&responses, "c")["data"], "Process 202 terminated");
    assert_eq!(service.get(202).kills(), 1);
}

#[tokio::test]
async fn test_ping_is_not_held_behind_a_slow_kill() {
    let service = Arc::new(MockService::new(vec![MockProcess::new(900, "stubborn", "alice").ignoring_kill()]));
    let tools = Arc::new(tools_for(&service));
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let server_task = tokio::spawn(handle_connection(server_read, server_write, tools));

    let (client_read, mut client_write) = tokio::io::split(client);
    let started = Instant::now();
    client_write
        .write_all(b"{\"cmd\":\"kill_process\",\"id\":\"k\",\"params\":{\"pid\":900}}\n{\"cmd\":\"ping\"}\n")
        .await
        .unwrap();

    let mut reader = BufReader::new(client_read).lines();
    let first: Value = serde_json::from_str(&reader.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["type"], "pong");
    assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());

    // The kill keeps waiting out its 1s timeout and still answers.
    client_write.shutdown().await.unwrap();
    let second: Value = serde_json::from_str(&reader.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["id"], "k");
    assert_eq!(second["data"], "Failed to kill 900: timed out after 1s waiting for exit");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(reader.next_line().await.unwrap().is_none());
    server_task.await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_real_host_listing_includes_self() {
    use pidwatch_daemon::collector::ProcfsService;

    let config = Config::default();
    let tools = ProcessTools::for_platform(Arc::new(ProcfsService::new()), &config);
    let params = ListProcessesParams { include_system: Some(true), ..memory_params() };
    let records = tools.list_processes(params).await.unwrap();

    let own: Vec<_> = records.iter().filter(|r| r.pid == std::process::id()).collect();
    assert_eq!(own.len(), 1);
    assert!(own[0].rss > 0);
    assert!(records.windows(2).all(|w| w[0].rss >= w[1].rss));
}
