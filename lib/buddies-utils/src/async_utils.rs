use tokio::sync::{broadcast, mpsc};

/// Forwards a broadcast subscription into an unbounded channel, mapping and filtering with `f`.
///
/// The forwarding task ends when either side goes away. Lagged receivers skip the lost
/// values instead of closing.
pub fn pipe_broadcast<I, O, F>(mut in_channel: broadcast::Receiver<I>, mut f: F) -> mpsc::UnboundedReceiver<O>
where
    I: 'static + Send + Clone,
    O: 'static + Send,
    F: 'static + FnMut(I) -> Option<O> + Send,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sender.closed() => {
                    // receiver is dropped, drop sender
                    break;
                },

                message_res = in_channel.recv() => {
                    let message_in = match message_res {
                        Ok(message) => message,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => {
                            // previous sender is dropped, drop sender
                            break
                        },
                    };
                    if let Some(message_out) = f(message_in) {
                        if sender.send(message_out).is_err() {
                            // receiver is dropped, drop sender
                            break
                        }
                    }
                },
            }
        }
    });
    receiver
}
