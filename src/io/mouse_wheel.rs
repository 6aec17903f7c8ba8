//! Mouse wheel. Scrolling acts like pressing the up or down arrow.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelEvent {
    pub delta_y: f64,
}

#[derive(Debug, Default)]
pub struct MouseWheel {
    last_delta: f64,
}

impl MouseWheel {
    /// Returns the arrow key the scroll maps to, if any.
    pub fn post_data(
        &mut self,
        event: WheelEvent,
    ) -> Option<&'static str> {
        self.last_delta = event.delta_y;
        if event.delta_y < 0.0 {
            Some("up arrow")
        } else if event.delta_y > 0.0 {
            Some("down arrow")
        } else {
            None
        }
    }

    #[inline]
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }
}
