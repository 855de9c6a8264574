//! Recording API integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lb_service::models::{PlaybackFormat, Recording, RecordingFilter};
use lb_service::repositories::RecordingCatalog;
use lb_test_utils::*;
use std::collections::BTreeMap;

fn recording(record_id: &str, meeting_id: &str, published: bool, meta: &[(&str, &str)]) -> Recording {
    Recording {
        record_id: record_id.to_string(),
        meeting_id: meeting_id.to_string(),
        name: format!("Recording of {meeting_id}"),
        published,
        state: if published { "published" } else { "unpublished" }.to_string(),
        start_time: 1_700_000_000_000,
        end_time: 1_700_000_600_000,
        participants: 3,
        metadata: meta
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
        playback_formats: vec![PlaybackFormat {
            format: "presentation".to_string(),
            url: format!("/playback/presentation/2.3/{record_id}"),
            length: 10,
            processing_time: 5000,
        }],
    }
}

async fn spawn() -> Result<TestLbServer, anyhow::Error> {
    TestLbServer::spawn_with(
        vec![],
        vec![
            recording("rec-a-1", "room-a", true, &[("course", "math")]),
            recording("rec-a-2", "room-a", false, &[("course", "art")]),
            recording("rec-b-1", "room-b", true, &[("term", "fall")]),
        ],
        &[],
    )
    .await
}

async fn get(server: &TestLbServer, action: &str, query: &str) -> Result<String, anyhow::Error> {
    Ok(server
        .client()
        .get(server.api_url(action, query))
        .send()
        .await?
        .text()
        .await?)
}

#[tokio::test]
async fn test_get_recordings_by_meeting() -> Result<(), anyhow::Error> {
    let server = spawn().await?;

    let body = get(&server, "getRecordings", "meetingID=room-a").await?;

    assert!(body.contains("<recordID>rec-a-1</recordID>"));
    assert!(body.contains("<recordID>rec-a-2</recordID>"));
    assert!(!body.contains("rec-b-1"));
    assert!(body.contains("<url>https://lb.example.com/playback/presentation/2.3/rec-a-1</url>"));
    Ok(())
}

#[tokio::test]
async fn test_get_recordings_by_metadata() -> Result<(), anyhow::Error> {
    let server = spawn().await?;

    let body = get(&server, "getRecordings", "meta_course=math&meta_term=fall").await?;

    assert!(body.contains("rec-a-1"));
    assert!(body.contains("rec-b-1"));
    assert!(!body.contains("rec-a-2"));
    Ok(())
}

#[tokio::test]
async fn test_get_recordings_none_found() -> Result<(), anyhow::Error> {
    let server = spawn().await?;

    let body = get(&server, "getRecordings", "meetingID=room-z").await?;

    assert!(body.contains("<returncode>SUCCESS</returncode>"));
    assert!(body.contains("<messageKey>noRecordings</messageKey>"));
    Ok(())
}

#[tokio::test]
async fn test_get_recordings_filtered_mode_requires_ids() -> Result<(), anyhow::Error> {
    let server =
        TestLbServer::spawn_with(vec![], vec![], &[("GET_RECORDINGS_API_FILTERED", "true")]).await?;

    let body = get(&server, "getRecordings", "").await?;

    assert!(body.contains("<messageKey>missingParameters</messageKey>"));
    Ok(())
}

#[tokio::test]
async fn test_publish_recordings() -> Result<(), anyhow::Error> {
    let server = spawn().await?;

    let body = get(&server, "publishRecordings", "recordID=rec-a-2&publish=true").await?;
    assert!(body.contains("<published>true</published>"));

    let found = server
        .catalog()
        .find(&RecordingFilter {
            record_ids: vec!["rec-a-2".to_string()],
            ..RecordingFilter::default()
        })
        .await?;
    assert!(found.first().unwrap().published);

    let body = get(&server, "publishRecordings", "recordID=rec-a-2").await?;
    assert!(body.contains("<messageKey>missingParamPublish</messageKey>"));

    let body = get(&server, "publishRecordings", "recordID=nope&publish=true").await?;
    assert!(body.contains("<messageKey>notFound</messageKey>"));
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete_recordings() -> Result<(), anyhow::Error> {
    let server = spawn().await?;

    let body = get(&server, "updateRecordings", "recordID=rec-b-1&meta_term=spring").await?;
    assert!(body.contains("<updated>true</updated>"));

    let body = get(&server, "getRecordings", "meta_term=spring").await?;
    assert!(body.contains("rec-b-1"));

    let body = get(&server, "deleteRecordings", "recordID=rec-b-1").await?;
    assert!(body.contains("<deleted>true</deleted>"));

    let body = get(&server, "getRecordings", "recordID=rec-b-1").await?;
    assert!(body.contains("noRecordings"));
    Ok(())
}

#[tokio::test]
async fn test_recordings_disabled() -> Result<(), anyhow::Error> {
    let server = TestLbServer::spawn_with(
        vec![],
        vec![recording("rec-a-1", "room-a", true, &[])],
        &[("RECORDING_DISABLED", "true")],
    )
    .await?;

    let body = get(&server, "getRecordings", "meetingID=room-a").await?;
    assert!(body.contains("<messageKey>notFound</messageKey>"));
    Ok(())
}
