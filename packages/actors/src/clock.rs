//! One-shot timer service for delayed message delivery.

use std::time::Duration;

use ractor::{ActorRef, Message};
use tokio::task::JoinHandle;

/// Deliver `msg` to `actor` after `delay` elapses.
///
/// Delivery goes through the target's mailbox, so the effect is applied
/// serially with the actor's other messages. A send to an actor that has
/// stopped in the meantime is dropped silently.
pub fn schedule_once<M: Message>(delay: Duration, actor: ActorRef<M>, msg: M) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = actor.send_message(msg);
    })
}
