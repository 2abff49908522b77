use serde::{Deserialize, Serialize};

use crate::models::{GroupId, Message};

/// Commands sent FROM client TO server over the WebSocket gateway.
///
/// Wire shape is `{"type": ..., "data": ...}`; variant names mirror the
/// event names the client emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Post a message to a group. The server assigns id and timestamp.
    #[serde(rename = "send_message")]
    SendMessage {
        group_id: GroupId,
        username: String,
        sender_id: String,
        text: String,
    },

    /// Announce the identity behind this connection so targeted events
    /// (forced logout) can reach it. Payload is the identity string.
    #[serde(rename = "register-user")]
    RegisterUser(String),
}

/// Events sent FROM server TO clients over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// A message was accepted and stored; carries the canonical record with
    /// server-assigned id and timestamp. Broadcast to every connection.
    #[serde(rename = "receive_message")]
    ReceiveMessage(Message),

    /// Targeted signal telling one client to terminate its session locally.
    #[serde(rename = "forceLogout")]
    ForceLogout,

    /// Targeted reply to the sender when its `send_message` was dropped.
    #[serde(rename = "send_message_failed")]
    SendMessageFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_user_payload_is_a_plain_string() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"register-user","data":"alice"}"#).unwrap();
        match cmd {
            GatewayCommand::RegisterUser(identity) => assert_eq!(identity, "alice"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_send_message_wire_shape() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"send_message","data":{"group_id":2,"username":"alice","sender_id":"u-1","text":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::SendMessage { group_id, text, .. } => {
                assert_eq!(group_id, GroupId(2));
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_force_logout_has_no_payload() {
        let json = serde_json::to_string(&GatewayEvent::ForceLogout).unwrap();
        assert_eq!(json, r#"{"type":"forceLogout"}"#);
    }
}
