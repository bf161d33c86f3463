//! Synthetic bid/offer generator and per-subscription broadcasting.
//!
//! The `QuoteGenerator` runs a background thread that random-walks a mid price per
//! instrument and, on every tick, sends each registered subscription the quotes of
//! its own instruments via `crossbeam_channel`. New subscriptions register by sending a
//! `QuoteSubscription` to the channel held by `GeneratorHandle`.
//!
//! Event model:
//! - `QuoteEvent::Quotes(Vec<InstrumentQuote>)` — one tick for one subscription, in the
//!   order the subscription listed its instruments.
//! - `QuoteEvent::Shutdown` — signal for consumers to terminate gracefully.
//!
//! Design notes:
//! - Prices are kept in a `HashMap<String, f64>` so every subscription sees the same
//!   price for the same instrument within a tick.
//! - Broadcast is best-effort: if sending to a subscription fails, it is removed.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bond_common::InstrumentQuote;
use crossbeam_channel::{Sender, unbounded};
use log::{debug, info};
use rand::Rng;

/// Mid price assigned to an instrument the first time it is seen.
pub const INITIAL_MID: f64 = 100.0;
/// Distance between bid and offer.
pub const SPREAD: f64 = 0.05;

/// Message sent by the generator to its subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    /// Latest quotes for the subscription's instruments.
    Quotes(Vec<InstrumentQuote>),
    /// Global shutdown notification for all consumers.
    Shutdown,
}

/// Registration of one subscription with the generator.
pub struct QuoteSubscription {
    /// Instruments to quote, in output order.
    pub instruments: Vec<String>,
    /// Where ticks are delivered.
    pub events: Sender<QuoteEvent>,
}

/// Random-walk the mid price by at most ±0.1%, keeping it positive.
pub fn next_mid(current: f64) -> f64 {
    let mut rng = rand::rng();
    let change: f64 = rng.random_range(-0.001..0.001);
    (current * (1.0 + change)).max(0.01)
}

/// Build a quote around `mid`, rounded to four decimals.
pub fn quote_around(instrument_id: &str, mid: f64) -> InstrumentQuote {
    let round = |value: f64| (value * 10_000.0).round() / 10_000.0;
    InstrumentQuote {
        instrument_id: instrument_id.to_string(),
        bid: round(mid - SPREAD / 2.0),
        offer: round(mid + SPREAD / 2.0),
    }
}

/// Handle for registering subscriptions and stopping the generator.
#[derive(Clone)]
pub struct GeneratorHandle {
    subscribe_tx: Sender<QuoteSubscription>,
    shutdown: Arc<AtomicBool>,
}

impl GeneratorHandle {
    /// Register a subscription; `false` if the generator has stopped.
    pub fn subscribe(&self, subscription: QuoteSubscription) -> bool {
        self.subscribe_tx.send(subscription).is_ok()
    }

    /// Ask the generator to broadcast `Shutdown` and exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Background market data generator that broadcasts to subscriptions.
pub struct QuoteGenerator;

impl QuoteGenerator {
    /// Start the generator thread ticking every `tick`.
    pub fn start(tick: Duration) -> GeneratorHandle {
        let (subscribe_tx, subscribe_rx) = unbounded::<QuoteSubscription>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);

        thread::spawn(move || {
            let mut subscriptions: Vec<QuoteSubscription> = Vec::new();
            let mut mids: HashMap<String, f64> = HashMap::new();
            info!("Quote generator started, tick {:?}", tick);

            while !stop.load(Ordering::SeqCst) {
                while let Ok(subscription) = subscribe_rx.try_recv() {
                    subscriptions.push(subscription);
                    debug!("Generator: {} subscription(s)", subscriptions.len());
                }

                for mid in mids.values_mut() {
                    *mid = next_mid(*mid);
                }
                subscriptions.retain(|subscription| {
                    let quotes = subscription
                        .instruments
                        .iter()
                        .map(|id| {
                            let mid = *mids.entry(id.clone()).or_insert(INITIAL_MID);
                            quote_around(id, mid)
                        })
                        .collect();
                    subscription.events.send(QuoteEvent::Quotes(quotes)).is_ok()
                });

                thread::sleep(tick);
            }

            for subscription in &subscriptions {
                let _ = subscription.events.send(QuoteEvent::Shutdown);
            }
            info!("Quote generator stopped");
        });

        GeneratorHandle {
            subscribe_tx,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_around_has_positive_spread() {
        let quote = quote_around("I1", 100.0);
        assert_eq!(quote.instrument_id, "I1");
        assert_eq!(quote.bid, 99.975);
        assert_eq!(quote.offer, 100.025);
    }

    #[test]
    fn test_next_mid_stays_close_and_positive() {
        for _ in 0..100 {
            let mid = next_mid(100.0);
            assert!((99.9..=100.1).contains(&mid));
        }
        assert!(next_mid(0.0) > 0.0);
    }

    #[test]
    fn test_subscription_receives_its_instruments_in_order() {
        let generator = QuoteGenerator::start(Duration::from_millis(5));
        let (events_tx, events_rx) = unbounded();
        assert!(generator.subscribe(QuoteSubscription {
            instruments: vec!["B".to_string(), "A".to_string()],
            events: events_tx,
        }));

        match events_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            QuoteEvent::Quotes(quotes) => {
                let ids: Vec<_> = quotes.iter().map(|q| q.instrument_id.as_str()).collect();
                assert_eq!(ids, vec!["B", "A"]);
                assert!(quotes.iter().all(|q| q.bid < q.offer));
            }
            other => panic!("unexpected event {:?}", other),
        }

        generator.shutdown();
        let shutdown_seen = events_rx
            .iter()
            .any(|event| event == QuoteEvent::Shutdown);
        assert!(shutdown_seen);
    }

    #[test]
    fn test_empty_subscription_gets_empty_ticks() {
        let generator = QuoteGenerator::start(Duration::from_millis(5));
        let (events_tx, events_rx) = unbounded();
        generator.subscribe(QuoteSubscription {
            instruments: Vec::new(),
            events: events_tx,
        });
        assert_eq!(
            events_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            QuoteEvent::Quotes(Vec::new())
        );
        generator.shutdown();
    }
}
