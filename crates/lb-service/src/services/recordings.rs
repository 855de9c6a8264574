//! Recording actions backed by the recording catalog.

use crate::config::Config;
use crate::errors::LbError;
use crate::models::{Recording, RecordingFilter, RequestParams};
use crate::repositories::{MetadataChange, RecordingCatalog};
use crate::xml::{ApiResponse, XmlNode};
use std::sync::Arc;
use tracing::{info, instrument};

const META_PREFIX: &str = "meta_";

#[derive(Clone)]
pub struct RecordingService {
    catalog: Arc<dyn RecordingCatalog>,
    config: Arc<Config>,
}

impl RecordingService {
    pub fn new(catalog: Arc<dyn RecordingCatalog>, config: Arc<Config>) -> Self {
        Self { catalog, config }
    }

    fn ensure_enabled(&self) -> Result<(), LbError> {
        if self.config.recording_disabled {
            return Err(LbError::RecordingNotFound);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn get_recordings(&self, params: &RequestParams) -> Result<ApiResponse, LbError> {
        self.ensure_enabled()?;

        let filter = RecordingFilter {
            meeting_ids: split_list(params.get("meetingID")),
            record_ids: split_list(params.get("recordID")),
            states: split_list(params.get("state")),
            meta: params
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(META_PREFIX)
                        .map(|key| (key.to_string(), split_list(Some(value))))
                })
                .collect(),
        };

        if self.config.get_recordings_api_filtered
            && filter.meeting_ids.is_empty()
            && filter.record_ids.is_empty()
        {
            return Err(LbError::MissingRecordingFilter);
        }

        let recordings = self.catalog.find(&filter).await?;
        if recordings.is_empty() {
            return Ok(ApiResponse::success(vec![
                XmlNode::element("recordings", Vec::new()),
                XmlNode::text("messageKey", "noRecordings"),
                XmlNode::text("message", "There are no recordings for the meeting(s)."),
            ]));
        }

        let nodes = recordings
            .iter()
            .map(|recording| recording_node(recording, &self.config.url_host))
            .collect();
        Ok(ApiResponse::success(vec![XmlNode::element("recordings", nodes)]))
    }

    #[instrument(skip_all)]
    pub async fn publish_recordings(&self, params: &RequestParams) -> Result<ApiResponse, LbError> {
        self.ensure_enabled()?;

        let record_ids = required_record_ids(params)?;
        let publish = params
            .get_non_empty("publish")
            .ok_or(LbError::MissingPublish)?
            .trim()
            .eq_ignore_ascii_case("true");

        let touched = self.catalog.set_published(&record_ids, publish).await?;
        if touched == 0 {
            return Err(LbError::RecordingNotFound);
        }

        info!(target: "lb.service.recordings", count = touched, publish, "Recordings published");
        Ok(ApiResponse::success(vec![XmlNode::text(
            "published",
            publish.to_string(),
        )]))
    }

    #[instrument(skip_all)]
    pub async fn update_recordings(&self, params: &RequestParams) -> Result<ApiResponse, LbError> {
        self.ensure_enabled()?;

        let record_ids = required_record_ids(params)?;
        let changes: Vec<MetadataChange> = params
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(META_PREFIX).map(|key| MetadataChange {
                    key: key.to_string(),
                    value: Some(value.to_string()).filter(|v| !v.is_empty()),
                })
            })
            .collect();

        let touched = self.catalog.update_metadata(&record_ids, &changes).await?;
        info!(target: "lb.service.recordings", count = touched, changes = changes.len(), "Recording metadata updated");

        Ok(ApiResponse::success(vec![XmlNode::text("updated", "true")]))
    }

    #[instrument(skip_all)]
    pub async fn delete_recordings(&self, params: &RequestParams) -> Result<ApiResponse, LbError> {
        self.ensure_enabled()?;

        let record_ids = required_record_ids(params)?;
        let touched = self.catalog.soft_delete(&record_ids).await?;
        if touched == 0 {
            return Err(LbError::RecordingNotFound);
        }

        info!(target: "lb.service.recordings", count = touched, "Recordings deleted");
        Ok(ApiResponse::success(vec![XmlNode::text("deleted", "true")]))
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required_record_ids(params: &RequestParams) -> Result<Vec<String>, LbError> {
    let ids = split_list(params.get("recordID"));
    if ids.is_empty() {
        return Err(LbError::MissingRecordId);
    }
    Ok(ids)
}

fn recording_node(recording: &Recording, url_host: &str) -> XmlNode {
    let metadata = recording
        .metadata
        .iter()
        .map(|(key, value)| XmlNode::text(key, value.clone()))
        .collect();

    let formats = recording
        .playback_formats
        .iter()
        .map(|format| {
            let url = if format.url.starts_with('/') {
                format!("https://{url_host}{}", format.url)
            } else {
                format.url.clone()
            };
            XmlNode::element(
                "format",
                vec![
                    XmlNode::text("type", format.format.clone()),
                    XmlNode::text("url", url),
                    XmlNode::text("length", format.length.to_string()),
                    XmlNode::text("processingTime", format.processing_time.to_string()),
                ],
            )
        })
        .collect();

    XmlNode::element(
        "recording",
        vec![
            XmlNode::text("recordID", recording.record_id.clone()),
            XmlNode::text("meetingID", recording.meeting_id.clone()),
            XmlNode::text("internalMeetingID", recording.record_id.clone()),
            XmlNode::text("name", recording.name.clone()),
            XmlNode::text("published", recording.published.to_string()),
            XmlNode::text("state", recording.state.clone()),
            XmlNode::text("startTime", recording.start_time.to_string()),
            XmlNode::text("endTime", recording.end_time.to_string()),
            XmlNode::text("participants", recording.participants.to_string()),
            XmlNode::element("metadata", metadata),
            XmlNode::element("playback", formats),
        ],
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::PlaybackFormat;
    use crate::repositories::InMemoryRecordingCatalog;
    use std::collections::{BTreeMap, HashMap};

    fn config(extra: &[(&str, &str)]) -> Arc<Config> {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("LB_STORE".to_string(), "memory".to_string()),
            ("LOADBALANCER_SECRET".to_string(), "primary".to_string()),
            ("URL_HOST".to_string(), "lb.example.com".to_string()),
        ]);
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Arc::new(Config::from_vars(&vars).unwrap())
    }

    fn recording(record_id: &str, meeting_id: &str, state: &str, start: i64) -> Recording {
        Recording {
            record_id: record_id.to_string(),
            meeting_id: meeting_id.to_string(),
            name: "Weekly sync".to_string(),
            published: state == "published",
            state: state.to_string(),
            start_time: start,
            end_time: start + 60_000,
            participants: 3,
            metadata: BTreeMap::from([("bbb-origin-tag".to_string(), "GL".to_string())]),
            playback_formats: vec![PlaybackFormat {
                format: "presentation".to_string(),
                url: "/playback/presentation/2.3/r1".to_string(),
                length: 12,
                processing_time: 4_500,
            }],
        }
    }

    fn service(extra: &[(&str, &str)]) -> (RecordingService, InMemoryRecordingCatalog) {
        let catalog = InMemoryRecordingCatalog::with_recordings([
            recording("r1", "m1", "published", 2),
            recording("r2", "m1", "unpublished", 1),
            recording("r3", "m2", "deleted", 3),
        ]);
        (
            RecordingService::new(Arc::new(catalog.clone()), config(extra)),
            catalog,
        )
    }

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_get_recordings_renders_visible_recordings() {
        let (service, _) = service(&[]);
        let doc = service
            .get_recordings(&params(&[("meetingID", "m1")]))
            .await
            .unwrap()
            .render();

        assert!(doc.contains("<returncode>SUCCESS</returncode><recordings><recording><recordID>r2</recordID>"));
        assert!(doc.contains("<internalMeetingID>r1</internalMeetingID>"));
        assert!(doc.contains("<metadata><bbb-origin-tag>GL</bbb-origin-tag></metadata>"));
        assert!(doc.contains(
            "<format><type>presentation</type>\
             <url>https://lb.example.com/playback/presentation/2.3/r1</url>\
             <length>12</length><processingTime>4500</processingTime></format>"
        ));
    }

    #[tokio::test]
    async fn test_get_recordings_empty_result() {
        let (service, _) = service(&[]);
        let doc = service
            .get_recordings(&params(&[("meetingID", "m2")]))
            .await
            .unwrap()
            .render();

        assert!(doc.contains("<messageKey>noRecordings</messageKey>"));
        assert!(doc.contains("There are no recordings for the meeting(s)."));
    }

    #[tokio::test]
    async fn test_get_recordings_filtered_requires_ids() {
        let (service, _) = service(&[("GET_RECORDINGS_API_FILTERED", "true")]);
        assert!(matches!(
            service.get_recordings(&params(&[("state", "any")])).await,
            Err(LbError::MissingRecordingFilter)
        ));
        assert!(service
            .get_recordings(&params(&[("recordID", "r1")]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_recording_disabled_answers_not_found() {
        let (service, _) = service(&[("RECORDING_DISABLED", "true")]);
        assert!(matches!(
            service.get_recordings(&params(&[])).await,
            Err(LbError::RecordingNotFound)
        ));
        assert!(matches!(
            service.delete_recordings(&params(&[("recordID", "r1")])).await,
            Err(LbError::RecordingNotFound)
        ));
    }

    #[tokio::test]
    async fn test_publish_recordings() {
        let (service, catalog) = service(&[]);

        assert!(matches!(
            service.publish_recordings(&params(&[("publish", "true")])).await,
            Err(LbError::MissingRecordId)
        ));
        assert!(matches!(
            service.publish_recordings(&params(&[("recordID", "r2")])).await,
            Err(LbError::MissingPublish)
        ));
        assert!(matches!(
            service
                .publish_recordings(&params(&[("recordID", "nope"), ("publish", "true")]))
                .await,
            Err(LbError::RecordingNotFound)
        ));

        let doc = service
            .publish_recordings(&params(&[("recordID", "r2"), ("publish", "true")]))
            .await
            .unwrap()
            .render();
        assert!(doc.contains("<published>true</published>"));

        let found = catalog
            .find(&RecordingFilter {
                record_ids: vec!["r2".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(found.first().unwrap().published);
    }

    #[tokio::test]
    async fn test_update_recordings_sets_and_removes_metadata() {
        let (service, catalog) = service(&[]);
        let doc = service
            .update_recordings(&params(&[
                ("recordID", "r1,r2"),
                ("meta_term", "fall"),
                ("meta_bbb-origin-tag", ""),
            ]))
            .await
            .unwrap()
            .render();
        assert!(doc.contains("<updated>true</updated>"));

        let found = catalog
            .find(&RecordingFilter {
                meeting_ids: vec!["m1".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        for recording in found {
            assert_eq!(recording.metadata.get("term").map(String::as_str), Some("fall"));
            assert!(!recording.metadata.contains_key("bbb-origin-tag"));
        }
    }

    #[tokio::test]
    async fn test_delete_recordings() {
        let (service, _) = service(&[]);

        assert!(matches!(
            service.delete_recordings(&params(&[("recordID", "123")])).await,
            Err(LbError::RecordingNotFound)
        ));

        let doc = service
            .delete_recordings(&params(&[("recordID", "r1")]))
            .await
            .unwrap()
            .render();
        assert!(doc.contains("<deleted>true</deleted>"));

        let doc = service
            .get_recordings(&params(&[("meetingID", "m1")]))
            .await
            .unwrap()
            .render();
        assert!(!doc.contains("<recordID>r1</recordID>"));
    }
}
