//! Hashtag feed demo.
//!
//! Messages are published to each of their hashtags; listeners subscribe to
//! the hashtags they follow and print what arrives. A message carrying two
//! followed hashtags is shown once.
//!
//! Run with `RUST_LOG=platform_pubsub=debug cargo run --example hashtag_feed`
//! to see subscription lifecycle logs.

use platform_pubsub::Bus;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Message {
    id: u32,
    username: String,
    body: String,
    hashtags: Vec<String>,
}

impl Message {
    fn new(id: u32, username: &str, body: &str, hashtags: &[&str]) -> Self {
        Self {
            id,
            username: username.to_string(),
            body: body.to_string(),
            hashtags: hashtags.iter().map(|tag| tag.to_string()).collect(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = Bus::<Message>::new();

    let listeners: Vec<_> = [("grace", vec!["rust", "release"]), ("linus", vec!["kernel"])]
        .into_iter()
        .map(|(name, hashtags)| {
            let subscription = bus.subscribe(&hashtags);
            let events = subscription.receiver();
            let handle = thread::spawn(move || {
                for message in events {
                    println!(
                        "[{name}] #{} <{}> {} (message {})",
                        message.hashtags.join(" #"),
                        message.username,
                        message.body,
                        message.id
                    );
                }
                println!("[{name}] disconnected");
            });
            (subscription, handle)
        })
        .collect();

    let messages = [
        Message::new(1, "ada", "1.0 is out", &["rust", "release"]),
        Message::new(2, "ken", "new scheduler merged", &["kernel"]),
        Message::new(3, "ada", "nobody follows this one", &["cooking"]),
        Message::new(4, "ken", "rust in the kernel", &["kernel", "rust"]),
    ];

    for message in messages {
        let hashtags = message.hashtags.clone();
        let delivered = bus.publish(message, &hashtags);
        tracing::info!(delivered, hashtags = ?hashtags, "message sent");
        thread::sleep(Duration::from_millis(10));
    }

    // Peers disconnect
    for (subscription, handle) in listeners {
        subscription.unsubscribe();
        if handle.join().is_err() {
            tracing::error!("listener thread panicked");
        }
    }

    let stats = bus.stats();
    println!(
        "published {} messages, {} deliveries, {} topics left",
        stats.events_published, stats.events_delivered, stats.topics
    );
}
