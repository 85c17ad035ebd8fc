use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};
use serde_derive::Serialize;

use crate::config;
use crate::proximity::Color;
use crate::ui::Ui;

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UiMqttMessage<'a> {
    Color { region: &'a str, color: Color },
    Status { region: &'a str, text: &'a str },
    Alert {
        region: &'a str,
        title: &'a str,
        message: &'a str,
    },
    Notification { region: &'a str, message: &'a str },
}

impl UiMqttMessage<'_> {
    fn channel(&self) -> &'static str {
        match self {
            UiMqttMessage::Color { .. } => "color",
            UiMqttMessage::Status { .. } => "status",
            UiMqttMessage::Alert { .. } => "alert",
            UiMqttMessage::Notification { .. } => "notification",
        }
    }
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .clone()
            .unwrap_or_else(|| "findme-rs".to_string());

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config
                    .topic_path
                    .clone()
                    .unwrap_or_else(|| "findme".to_string()),
            },
            eventloop,
        )
    }

    /// Drives the connection; outgoing publishes only leave while this is polled.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    debug!("Connection acknowledged");
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::PubAck(_))) => {
                    debug!("Publish acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub fn ui(&self, region: &str) -> MqttUi {
        MqttUi {
            client: self.clone(),
            region: region.to_string(),
        }
    }

    fn topic(&self, channel: &str) -> String {
        format!("{}/{}/{}", self.topic_path, self.publisher_id, channel)
    }

    fn announce(&self, message: &UiMqttMessage<'_>) -> Result<(), rumqttc::ClientError> {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error serializing MQTT message: {:?}", err);
                return Ok(());
            }
        };
        self.client.try_publish(
            self.topic(message.channel()),
            QoS::AtMostOnce,
            false,
            payload,
        )
    }

    pub async fn disconnect(&self) -> crate::error::Result<()> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Publishes UI updates for one region.
#[derive(Debug, Clone)]
pub struct MqttUi {
    client: MqttClient,
    region: String,
}

impl MqttUi {
    fn publish(&self, message: UiMqttMessage<'_>) {
        if let Err(err) = self.client.announce(&message) {
            error!("Error publishing {} update: {:?}", message.channel(), err);
        }
    }
}

impl Ui for MqttUi {
    fn set_background_color(&mut self, color: Color) {
        self.publish(UiMqttMessage::Color {
            region: &self.region,
            color,
        });
    }

    fn set_status_text(&mut self, text: &str) {
        self.publish(UiMqttMessage::Status {
            region: &self.region,
            text,
        });
    }

    fn show_alert(&mut self, title: &str, message: &str) {
        info!("Announcing alert '{}' on MQTT", title);
        self.publish(UiMqttMessage::Alert {
            region: &self.region,
            title,
            message,
        });
    }

    fn schedule_local_notification(&mut self, message: &str) {
        self.publish(UiMqttMessage::Notification {
            region: &self.region,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (MqttClient, rumqttc::EventLoop) {
        let config = config::MqttConfig {
            host: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            publisher_id: Some("hallway".to_string()),
            topic_path: None,
            keep_alive_seconds: None,
        };
        MqttClient::new(&config)
    }

    #[test]
    fn test_topic() {
        let (client, _eventloop) = client();
        assert_eq!(client.topic("alert"), "findme/hallway/alert");
        assert_eq!(client.topic("color"), "findme/hallway/color");
    }

    #[test]
    fn test_message_payloads() {
        let message = UiMqttMessage::Color {
            region: "store",
            color: Color::Green,
        };
        assert_eq!(message.channel(), "color");
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"type":"color","region":"store","color":"green"}"#
        );

        let message = UiMqttMessage::Alert {
            region: "store",
            title: "Good Bye",
            message: "Have a nice day",
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "type": "alert",
                "region": "store",
                "title": "Good Bye",
                "message": "Have a nice day",
            })
        );
    }

    #[test]
    fn test_ui_publish_queues_without_connection() {
        let (client, _eventloop) = client();
        // The request channel holds 10 messages until the event loop drains them.
        assert!(
            client
                .announce(&UiMqttMessage::Status {
                    region: "store",
                    text: "Near",
                })
                .is_ok()
        );

        let mut ui = client.ui("store");
        ui.set_background_color(Color::Gray);
    }

    #[tokio::test]
    async fn test_disconnect_without_event_loop() {
        let (client, eventloop) = client();
        drop(eventloop);
        let err = client.disconnect().await.unwrap_err();
        assert!(matches!(err, crate::error::FindMeError::Mqtt(_)));
    }
}
