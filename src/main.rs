use std::env;

use log::info;
use mqtt_client::{ConnectionOptions, QoS, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let broker = env::var("MQTT_BROKER").unwrap_or_else(|_| "tcp://127.0.0.1:1883".into());

    let mut options = ConnectionOptions::new(broker)
        .client_id(env::var("MQTT_CLIENT_ID").unwrap_or_default());
    if let Ok(username) = env::var("MQTT_USERNAME") {
        let password = env::var("MQTT_PASSWORD").unwrap_or_default();
        options = options.credentials(username, password);
    }

    info!("Connecting to {}...", options.socket_address());
    let session = Session::new(options);
    let return_code = session.connect().await?;
    info!("CONNACK return code {return_code}");

    let granted = session
        .subscribe("#", QoS::AtMostOnce, |message| {
            info!(
                "Message on {} (qos {}, id {:?}): {}",
                message.topic,
                message.qos,
                message.packet_id,
                String::from_utf8_lossy(&message.payload)
            );
        })
        .await?;
    info!("Subscribed to #, granted {granted:?}");

    session.publish("/test", "Hello mqtt!", QoS::AtLeastOnce).await?;
    info!("Published to /test, press Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;

    session.disconnect().await;

    Ok(())
}
