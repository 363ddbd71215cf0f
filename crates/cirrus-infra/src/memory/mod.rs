//! In-process transport for tests and single-process deployments.
//!
//! - `transport` -- `InMemoryTransport`: queues, topics, and the `Publisher`
//! - `receiver` -- `InMemoryReceiver`: worker tasks feeding a pump callback
//! - `queue` -- peek-lock queue with redelivery and dead-lettering

mod queue;
pub mod receiver;
pub mod transport;

pub use receiver::InMemoryReceiver;
pub use transport::{DEFAULT_MAX_DELIVERY_ATTEMPTS, InMemoryTransport, subscription_path};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{anyhow, bail};
    use cirrus_core::diagnostics::{FAILURE_MESSAGE, FAILURE_TYPE};
    use cirrus_core::dispatch::{Handled, handler_fn};
    use cirrus_core::envelope;
    use cirrus_core::{
        Bus, HandlerDispatcher, MessagePump, Publisher, ResponseCorrelator, SystemClock,
    };
    use cirrus_types::message::BusMessage;
    use serde_json::json;

    use super::*;

    type Pump = MessagePump<InMemoryReceiver, HandlerDispatcher>;

    const REPLY_QUEUE: &str = "replies.client-1";

    fn pump(transport: &InMemoryTransport, queue: &str, dispatcher: HandlerDispatcher) -> Pump {
        let receiver = transport.receiver(queue, 2).unwrap();
        MessagePump::new(
            Arc::new(receiver),
            Arc::new(dispatcher),
            Arc::new(SystemClock),
        )
    }

    fn dispatcher(
        transport: &InMemoryTransport,
        correlator: &Arc<ResponseCorrelator>,
    ) -> HandlerDispatcher {
        HandlerDispatcher::new(Arc::clone(correlator), Arc::new(transport.clone()))
    }

    /// Responder that black-balls whoever is nominated.
    fn responder(
        transport: &InMemoryTransport,
        correlator: &Arc<ResponseCorrelator>,
        subscription: &'static str,
    ) -> Pump {
        let queue = transport.subscribe("membership", subscription);
        let mut dispatcher = dispatcher(transport, correlator);
        dispatcher.register_handler(
            "black_ball_request",
            handler_fn(subscription, move |msg: BusMessage| async move {
                Ok(Handled::reply(
                    "black_ball_response",
                    json!({
                        "responder": subscription,
                        "candidate": msg.body["name"],
                        "blackballed": true,
                    }),
                ))
            }),
        );
        pump(transport, &queue, dispatcher)
    }

    async fn eventually(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn fred_flintstone_is_black_balled_by_both_responders() {
        let transport = InMemoryTransport::default();
        transport.create_queue(REPLY_QUEUE);
        let correlator = Arc::new(ResponseCorrelator::new());

        let barney = responder(&transport, &correlator, "barney");
        let wilma = responder(&transport, &correlator, "wilma");
        let client = pump(&transport, REPLY_QUEUE, dispatcher(&transport, &correlator));
        for p in [&barney, &wilma, &client] {
            p.start().await.unwrap();
        }

        let bus = Bus::new(
            Arc::new(transport.clone()),
            Arc::clone(&correlator),
            REPLY_QUEUE,
            Duration::from_secs(10),
        );
        let responses = bus
            .multicast_request(
                "membership",
                "black_ball_request",
                json!({"name": "Fred Flintstone"}),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        let mut responders: Vec<_> = responses
            .iter()
            .map(|r| r.body["responder"].as_str().unwrap().to_string())
            .collect();
        responders.sort();
        assert_eq!(responders, vec!["barney", "wilma"]);
        assert!(responses.iter().all(|r| r.body["candidate"] == "Fred Flintstone"));
        assert_eq!(correlator.pending_count(), 0);

        for p in [&barney, &wilma, &client] {
            p.stop().await.unwrap();
        }
        // Both replies were completed, none redelivered.
        assert_eq!(transport.completed(REPLY_QUEUE).unwrap().len(), 2);
        assert!(transport.dead_letters(REPLY_QUEUE).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_completed_and_dropped() {
        let transport = InMemoryTransport::default();
        transport.create_queue(REPLY_QUEUE);
        let correlator = Arc::new(ResponseCorrelator::new());

        let queue = transport.subscribe("membership", "slowpoke");
        let mut slow = dispatcher(&transport, &correlator);
        slow.register_handler(
            "black_ball_request",
            handler_fn("slowpoke", |_msg: BusMessage| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(Handled::reply("black_ball_response", json!({})))
            }),
        );
        let slow = pump(&transport, &queue, slow);
        let client = pump(&transport, REPLY_QUEUE, dispatcher(&transport, &correlator));
        slow.start().await.unwrap();
        client.start().await.unwrap();

        let bus = Bus::new(
            Arc::new(transport.clone()),
            Arc::clone(&correlator),
            REPLY_QUEUE,
            Duration::from_secs(1),
        );
        let responses = bus
            .multicast_request_default("membership", "black_ball_request", json!({}))
            .await
            .unwrap();
        assert!(responses.is_empty());

        let completed = || transport.completed(REPLY_QUEUE).unwrap().len() == 1;
        eventually(completed).await;
        assert!(transport.dead_letters(REPLY_QUEUE).unwrap().is_empty());

        slow.stop().await.unwrap();
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failing_handler_is_redelivered_then_dead_lettered() {
        let transport = InMemoryTransport::new(3);
        transport.create_queue("orders");
        let correlator = Arc::new(ResponseCorrelator::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut orders = dispatcher(&transport, &correlator);
        {
            let attempts = Arc::clone(&attempts);
            orders.register_handler(
                "place_order",
                handler_fn("order_book", move |_msg: BusMessage| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<Handled, _>(anyhow!("warehouse unreachable"))
                    }
                }),
            );
        }
        let pump = pump(&transport, "orders", orders);
        pump.start().await.unwrap();

        let bus = Bus::new(
            Arc::new(transport.clone()),
            correlator,
            REPLY_QUEUE,
            Duration::from_secs(1),
        );
        bus.send(envelope::command("orders", "place_order", json!({})))
            .await
            .unwrap();

        eventually(|| !transport.dead_letters("orders").unwrap().is_empty()).await;
        pump.stop().await.unwrap();

        let dead = transport.dead_letters("orders").unwrap();
        assert_eq!(dead[0].delivery_count, 3);
        assert_eq!(dead[0].properties[FAILURE_TYPE], "handler");
        assert!(dead[0].properties[FAILURE_MESSAGE].contains("order_book"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(transport.completed("orders").unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_succeeds_on_redelivery() {
        let transport = InMemoryTransport::default();
        transport.create_queue("orders");
        let correlator = Arc::new(ResponseCorrelator::new());

        let mut orders = dispatcher(&transport, &correlator);
        orders.register_handler(
            "place_order",
            handler_fn("flaky", |msg: BusMessage| async move {
                if msg.delivery_count < 2 {
                    bail!("first attempt always fails");
                }
                Ok(Handled::Done)
            }),
        );
        let pump = pump(&transport, "orders", orders);
        pump.start().await.unwrap();

        transport
            .publish(envelope::command("orders", "place_order", json!({})))
            .await
            .unwrap();

        eventually(|| !transport.completed("orders").unwrap().is_empty()).await;
        pump.stop().await.unwrap();

        let done = transport.completed("orders").unwrap();
        assert_eq!(done[0].delivery_count, 2);
        assert_eq!(done[0].properties[FAILURE_TYPE], "handler");
    }

    #[tokio::test]
    async fn panicking_handler_is_abandoned_and_redelivered() {
        let transport = InMemoryTransport::default();
        transport.create_queue("orders");
        let correlator = Arc::new(ResponseCorrelator::new());

        let mut orders = dispatcher(&transport, &correlator);
        orders.register_handler(
            "place_order",
            handler_fn("brittle", |msg: BusMessage| async move {
                if msg.delivery_count < 2 {
                    panic!("stock index out of range");
                }
                Ok(Handled::Done)
            }),
        );
        let pump = pump(&transport, "orders", orders);
        pump.start().await.unwrap();

        transport
            .publish(envelope::command("orders", "place_order", json!({})))
            .await
            .unwrap();

        eventually(|| !transport.completed("orders").unwrap().is_empty()).await;
        assert!(pump.is_running());
        pump.stop().await.unwrap();

        let done = transport.completed("orders").unwrap();
        assert_eq!(done[0].delivery_count, 2);
        assert_eq!(done[0].properties[FAILURE_TYPE], "panic");
        assert!(done[0].properties[FAILURE_MESSAGE].contains("stock index out of range"));
    }

    #[tokio::test]
    async fn unhandled_body_type_is_dead_lettered() {
        let transport = InMemoryTransport::new(1);
        transport.create_queue("orders");
        let correlator = Arc::new(ResponseCorrelator::new());
        let pump = pump(&transport, "orders", dispatcher(&transport, &correlator));
        pump.start().await.unwrap();

        transport
            .publish(envelope::command("orders", "mystery", json!({})))
            .await
            .unwrap();

        eventually(|| !transport.dead_letters("orders").unwrap().is_empty()).await;
        pump.stop().await.unwrap();

        let dead = transport.dead_letters("orders").unwrap();
        assert_eq!(dead[0].properties[FAILURE_TYPE], "no_handler");
    }
}
