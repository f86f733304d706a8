//! Boot path of the daemon: configuration file to a running coordinator.

use std::io::Write;
use std::time::Duration;

use switchboard::prelude::*;
use switchboard::sip_core::prelude::{HeaderAccess, HeaderName, Message, StatusCode};
use switchboard::sip_core::parse_message;
use tokio::net::UdpSocket;

const CONFIG: &str = r#"
[signaling]
bind_addr = "127.0.0.1:0"
user_agent = "switchboard-test"

[media]
bind_ip = "127.0.0.1"
rtp_port_start = 0
rtp_port_end = 0

[collaborators]
voicemail_media = "127.0.0.1:30000"
auto_attendant_media = "127.0.0.1:30002"

[collaborators.extensions]
"1002" = "127.0.0.1:5099"
"#;

fn load() -> SwitchboardConfig {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    SwitchboardConfig::load(Some(file.path())).unwrap()
}

#[test]
fn config_file_wires_collaborators() {
    let config = load();
    assert_eq!(config.signaling.user_agent, "switchboard-test");
    let registry = registry_from_config(&config.collaborators);
    assert_eq!(registry.len(), 3);
    assert!(registry.contains(DestinationKind::Extension));
    assert!(registry.contains(DestinationKind::AutoAttendant));
    assert!(!registry.contains(DestinationKind::Paging));
}

#[tokio::test]
async fn coordinator_answers_keepalives_and_shuts_down() {
    let config = load();
    let registry = registry_from_config(&config.collaborators);
    let coordinator = SessionCoordinator::new(config, registry).await.unwrap();
    let run = coordinator.start();

    let phone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let options = format!(
        "OPTIONS sip:pbx@{pbx} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {me};branch=z9hG4bKka1\r\n\
         From: <sip:1001@pbx>;tag=a\r\n\
         To: <sip:pbx@pbx>\r\n\
         Call-ID: keepalive-1\r\n\
         CSeq: 1 OPTIONS\r\n\
         Content-Length: 0\r\n\r\n",
        pbx = coordinator.local_addr(),
        me = phone.local_addr().unwrap(),
    );
    phone.send_to(options.as_bytes(), coordinator.local_addr()).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(3), phone.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let Message::Response(response) = parse_message(&buf[..len]).unwrap() else {
        panic!("expected a response");
    };
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.header(&HeaderName::Server), Some("switchboard-test"));

    coordinator.shutdown().await;
    tokio::time::timeout(Duration::from_secs(3), run).await.unwrap().unwrap();
    assert_eq!(coordinator.call_count(), 0);
}
