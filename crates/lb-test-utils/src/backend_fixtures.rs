//! Backend fixtures.
//!
//! Server records pointing at a wiremock backend, and the XML documents a
//! conferencing backend answers with.

use common::secret::SecretString;
use lb_service::models::{Server, ServerState};

/// Secret every fixture backend shares with the gateway.
pub const TEST_BACKEND_SECRET: &str = "test-backend-secret";

/// An enabled, online server whose API lives at `{base_url}/{id}/bigbluebutton/api/`.
///
/// Using the id in the path lets one `MockServer` stand in for many backends.
pub fn test_server(id: &str, base_url: &str, load: i64) -> Server {
    Server {
        id: id.to_string(),
        url: format!("{base_url}/{id}/bigbluebutton/api/"),
        secret: SecretString::from(TEST_BACKEND_SECRET),
        load,
        load_multiplier: 1.0,
        state: ServerState::Enabled,
        online: true,
    }
}

/// Path of `action` on a fixture server, for wiremock `path` matchers.
pub fn backend_path(id: &str, action: &str) -> String {
    format!("/{id}/bigbluebutton/api/{action}")
}

/// `<response>` with `SUCCESS` and the given inner XML.
pub fn success_xml(inner: &str) -> String {
    format!("<?xml version=\"1.0\"?>\n<response><returncode>SUCCESS</returncode>{inner}</response>")
}

/// `<response>` with `FAILED`, a message key and a message.
pub fn failed_xml(message_key: &str, message: &str) -> String {
    format!(
        "<response><returncode>FAILED</returncode><messageKey>{message_key}</messageKey>\
         <message>{message}</message></response>"
    )
}

/// A successful create reply for `meeting_id`.
pub fn create_xml(meeting_id: &str) -> String {
    success_xml(&format!(
        "<meetingID>{meeting_id}</meetingID><internalMeetingID>{meeting_id}-internal</internalMeetingID>\
         <createTime>1700000000000</createTime><hasBeenForciblyEnded>false</hasBeenForciblyEnded>"
    ))
}

/// A getMeetings reply listing `meeting_ids`.
pub fn meetings_xml(meeting_ids: &[&str]) -> String {
    let meetings: String = meeting_ids
        .iter()
        .map(|id| format!("<meeting><meetingID>{id}</meetingID><running>true</running></meeting>"))
        .collect();
    success_xml(&format!("<meetings>{meetings}</meetings>"))
}

/// The getMeetings reply of a backend hosting nothing.
pub fn no_meetings_xml() -> String {
    success_xml(
        "<meetings/><messageKey>noMeetings</messageKey>\
         <message>no meetings were found on this server</message>",
    )
}
