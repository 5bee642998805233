use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

#[zbus::proxy(
    interface = "dev.moodlens.Moodlens1",
    default_service = "dev.moodlens.Moodlens1",
    default_path = "/dev/moodlens/Moodlens1"
)]
trait Moodlens {
    async fn status(&self) -> zbus::Result<String>;
    async fn current(&self) -> zbus::Result<String>;
    async fn set_smoothing(&self, level: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn emotion_cycle(&self, payload: String) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "moodlens", about = "Moodlens emotion visualizer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Print the latest detection cycle
    Current,
    /// Stream detection cycles as they complete
    Watch {
        /// Print raw JSON payloads instead of a one-line summary
        #[arg(long)]
        json: bool,
    },
    /// Change the smoothing preset
    Smoothing {
        /// One of: low, medium, high
        level: String,
    },
    /// List available camera devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let proxy = connect().await?;
            println!("{}", proxy.status().await?);
        }
        Commands::Current => {
            let proxy = connect().await?;
            println!("{}", proxy.current().await?);
        }
        Commands::Watch { json } => {
            let proxy = connect().await?;
            let mut cycles = proxy.receive_emotion_cycle().await?;
            while let Some(signal) = cycles.next().await {
                let args = signal.args()?;
                if json {
                    println!("{}", args.payload());
                } else {
                    println!("{}", summarize(args.payload()));
                }
            }
        }
        Commands::Smoothing { level } => {
            let proxy = connect().await?;
            proxy.set_smoothing(&level).await?;
            println!("smoothing set to {level}");
        }
        Commands::Devices => {
            let devices = moodlens_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for device in devices {
                println!("{}  {} ({})", device.path, device.name, device.driver);
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<MoodlensProxy<'static>> {
    let connection = zbus::Connection::session().await?;
    Ok(MoodlensProxy::new(&connection).await?)
}

/// One-line summary of a cycle payload: dominant emotion, confidence, mood.
fn summarize(payload: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return payload.to_string();
    };

    let Some(result) = value.get("result").filter(|r| !r.is_null()) else {
        return "no face".to_string();
    };

    let emotion = result["emotion"].as_str().unwrap_or("?");
    let mood = result["mood"].as_str().unwrap_or("?");
    let confidence = result["confidence"].as_f64().unwrap_or(0.0);
    format!("{emotion} {:.0}% ({mood})", confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_face_payload() {
        let payload = r#"{"face_detected":true,"result":{"emotion":"happy","confidence":0.82,"mood":"positive"}}"#;
        assert_eq!(summarize(payload), "happy 82% (positive)");
    }

    #[test]
    fn test_summarize_no_face_payload() {
        let payload = r#"{"face_detected":false,"result":null}"#;
        assert_eq!(summarize(payload), "no face");
    }

    #[test]
    fn test_summarize_garbage_passes_through() {
        assert_eq!(summarize("not json"), "not json");
    }
}
