//! Terminal input and the escalation prompt
//!
//! Stdin is read on one dedicated thread and handed out line by line, so the
//! chat loop and the escalation prompt never race for it and an abandoned
//! prompt never swallows the next chat message.

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use ssdlc_engine::{EscalationDecision, EscalationRequest, Escalator};

const LINE_BUFFER: usize = 16;

/// Lines typed on stdin, shared by every reader in the process.
#[derive(Debug, Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl ConsoleInput {
    /// Start the stdin reader thread.
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self::from_receiver(rx))
    }

    pub(crate) fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line without its terminator; `None` at end of input.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

/// Asks the operator on stderr. End of input or cancellation means abort.
#[derive(Debug, Clone)]
pub struct ConsoleEscalator {
    input: ConsoleInput,
}

impl ConsoleEscalator {
    #[must_use]
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Escalator for ConsoleEscalator {
    async fn escalate(
        &self,
        request: &EscalationRequest<'_>,
        cancel: &CancellationToken,
    ) -> EscalationDecision {
        let mut stderr = io::stderr();
        tokio::select! {
            decision = ask(&self.input, &mut stderr, request) => decision,
            () = cancel.cancelled() => {
                let _ = writeln!(io::stderr(), "\n  Interrupted; aborting the {} stage.", request.stage.title());
                EscalationDecision::Abort
            }
        }
    }
}

pub(crate) async fn ask(
    input: &ConsoleInput,
    output: &mut (impl Write + Send),
    request: &EscalationRequest<'_>,
) -> EscalationDecision {
    let choices = if request.allow_wait_more {
        "[c]ontinue without it, [w]ait longer, [a]bort"
    } else {
        "[c]ontinue without it, [a]bort"
    };

    let _ = writeln!(
        output,
        "\n✗ The {} stage failed after {} attempt(s) ({}).\n  {}",
        request.stage.title(),
        request.attempts,
        request.class.label(),
        request.message
    );
    if request.allow_wait_more {
        let _ = writeln!(
            output,
            "  The provider is rate limiting; waiting longer adds {}s and one more attempt.",
            request.extra_wait.as_secs()
        );
    }

    loop {
        let _ = write!(output, "  {choices}: ");
        let _ = output.flush();

        let Some(line) = input.next_line().await else {
            return EscalationDecision::Abort;
        };
        if let Some(decision) = parse_decision(&line, request.allow_wait_more) {
            return decision;
        }
        let _ = writeln!(output, "  Please answer with one of: {choices}");
    }
}

pub(crate) fn parse_decision(answer: &str, allow_wait_more: bool) -> Option<EscalationDecision> {
    match answer.trim().to_lowercase().as_str() {
        "c" | "continue" | "y" | "yes" => Some(EscalationDecision::Continue),
        "w" | "wait" if allow_wait_more => Some(EscalationDecision::WaitMore),
        "a" | "abort" | "n" | "no" => Some(EscalationDecision::Abort),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssdlc_stage_api::StageId;
    use ssdlc_utils::types::ErrorClass;
    use std::time::Duration;

    fn request(allow_wait_more: bool) -> EscalationRequest<'static> {
        EscalationRequest {
            stage: StageId::Security,
            class: ErrorClass::ServiceUnavailable,
            attempts: 3,
            message: "503 UNAVAILABLE",
            allow_wait_more,
            extra_wait: Duration::from_secs(120),
        }
    }

    /// Input that yields `lines`, then end of input.
    fn scripted_input(lines: &[&str]) -> ConsoleInput {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send((*line).to_string()).unwrap();
        }
        ConsoleInput::from_receiver(rx)
    }

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision(" Continue\n", false), Some(EscalationDecision::Continue));
        assert_eq!(parse_decision("w", true), Some(EscalationDecision::WaitMore));
        assert_eq!(parse_decision("w", false), None);
        assert_eq!(parse_decision("abort", false), Some(EscalationDecision::Abort));
        assert_eq!(parse_decision("maybe", true), None);
    }

    #[tokio::test]
    async fn test_ask_reprompts_until_valid() {
        let input = scripted_input(&["dunno", "wait", "c"]);
        let mut output = Vec::new();

        let decision = ask(&input, &mut output, &request(false)).await;

        assert_eq!(decision, EscalationDecision::Continue);
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Security Requirements stage failed after 3 attempt(s)"));
        assert_eq!(shown.matches("Please answer").count(), 2);
    }

    #[tokio::test]
    async fn test_ask_eof_aborts() {
        let input = scripted_input(&[]);
        let mut output = Vec::new();
        assert_eq!(ask(&input, &mut output, &request(true)).await, EscalationDecision::Abort);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_aborts_and_keeps_later_input() {
        let (tx, rx) = mpsc::channel(4);
        let input = ConsoleInput::from_receiver(rx);
        let escalator = ConsoleEscalator::new(input.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        // No line has been typed; the prompt must not wait for one.
        let decision = escalator.escalate(&request(false), &cancel).await;
        assert_eq!(decision, EscalationDecision::Abort);

        // The next line still reaches the chat loop.
        tx.send("continue".to_string()).await.unwrap();
        assert_eq!(input.next_line().await.as_deref(), Some("continue"));
    }
}
