//! Pluggable hooks around dispatch: the narration policy that may hold back
//! turn-consuming actions, and subscribers that observe every result.
use super::ActionResult;

/// Decides whether another turn-consuming action may run.
pub trait NarrationPolicy: Send + Sync {
    /// `since_narration` counts turn actions dispatched since the last
    /// narration. Return a message to refuse the action.
    fn check(&self, since_narration: u32) -> Result<(), String>;
}

/// Demand a narration every `n` turn actions.
#[derive(Debug, Clone, Copy)]
pub struct EveryNActions(pub u32);

impl NarrationPolicy for EveryNActions {
    fn check(&self, since_narration: u32) -> Result<(), String> {
        if self.0 > 0 && since_narration >= self.0 {
            Err(format!(
                "narrate before continuing: {} actions taken since the last narration",
                since_narration
            ))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPolicy;

impl NarrationPolicy for NoPolicy {
    fn check(&self, _since_narration: u32) -> Result<(), String> {
        Ok(())
    }
}

/// Policy for a configured interval; 0 disables it.
pub fn from_interval(interval: u32) -> Box<dyn NarrationPolicy> {
    if interval == 0 {
        Box::new(NoPolicy)
    } else {
        Box::new(EveryNActions(interval))
    }
}

/// Knowledge base or telemetry sink.
pub trait ResultSubscriber: Send + Sync {
    fn on_result(&self, result: &ActionResult);

    fn on_narration(&self, _thought: &str) {}
}
