//! Motor peripheral extension.
//!
//! The hardware side sits behind [`MotorLink`]. A failed write marks the link
//! down; reconnects are attempted no more often than the backoff interval and
//! writes in between are dropped. A global stop zeroes every motor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::runtime::events::RuntimeEvent;
use crate::runtime::primitives::{BlockError, BlockPackage, BlockResult, BlockUtility, PrimitiveExport};
use crate::runtime::value::{cast, BlockArgs, Value};

/// Number of motor ports.
pub const MOTOR_PORTS: usize = 4;
/// Wait between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Link faults.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("Peripheral is not connected")]
    Disconnected,
    #[error("Peripheral I/O failed: {0}")]
    Io(String),
}

/// Transport to a motor controller.
pub trait MotorLink: Send {
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Set one port's speed in percent, -100..=100.
    fn write_speed(
        &mut self,
        port: usize,
        speed: f64,
    ) -> Result<(), LinkError>;

    fn disconnect(&mut self);
}

// ============================================================================
// LoopbackMotorLink
// ============================================================================

/// What a [`LoopbackMotorLink`] has seen.
#[derive(Debug, Default)]
pub struct LoopbackLog {
    pub connects: u32,
    pub writes: Vec<(usize, f64)>,
    /// Remaining writes to fail, for exercising reconnects.
    pub fail_writes: u32,
    /// Remaining connects to fail.
    pub fail_connects: u32,
}

/// In-memory link that records writes.
#[derive(Debug, Clone, Default)]
pub struct LoopbackMotorLink {
    log: Arc<Mutex<LoopbackLog>>,
}

impl LoopbackMotorLink {
    /// Shared view of the log.
    pub fn log(&self) -> Arc<Mutex<LoopbackLog>> {
        Arc::clone(&self.log)
    }
}

impl MotorLink for LoopbackMotorLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        let mut log = self.log.lock();
        if log.fail_connects > 0 {
            log.fail_connects -= 1;
            return Err(LinkError::Io("connect refused".into()));
        }
        log.connects += 1;
        Ok(())
    }

    fn write_speed(
        &mut self,
        port: usize,
        speed: f64,
    ) -> Result<(), LinkError> {
        let mut log = self.log.lock();
        if log.fail_writes > 0 {
            log.fail_writes -= 1;
            return Err(LinkError::Io("write failed".into()));
        }
        log.writes.push((port, speed));
        Ok(())
    }

    fn disconnect(&mut self) {}
}

// ============================================================================
// Motor state
// ============================================================================

struct Motors {
    link: Box<dyn MotorLink>,
    connected: bool,
    retry_at: Option<Instant>,
    backoff: Duration,
    speeds: [f64; MOTOR_PORTS],
}

impl Motors {
    /// Make sure the link is up, respecting the backoff.
    fn ensure_connected(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let now = Instant::now();
        if self.retry_at.is_some_and(|at| now < at) {
            return false;
        }
        match self.link.connect() {
            Ok(()) => {
                info!("Motor link connected");
                self.connected = true;
                self.retry_at = None;
                true
            }
            Err(e) => {
                warn!("Motor link connect failed: {}; retrying in {:?}", e, self.backoff);
                self.retry_at = Some(now + self.backoff);
                false
            }
        }
    }

    fn set_speed(
        &mut self,
        port: usize,
        speed: f64,
    ) {
        self.speeds[port] = speed;
        if !self.ensure_connected() {
            debug!("Motor link down; dropped speed {} for port {}", speed, port);
            return;
        }
        if let Err(e) = self.link.write_speed(port, speed) {
            warn!("Motor write failed: {}; retrying in {:?}", e, self.backoff);
            self.connected = false;
            self.link.disconnect();
            self.retry_at = Some(Instant::now() + self.backoff);
        }
    }

    fn stop_all(&mut self) {
        for port in 0..MOTOR_PORTS {
            if self.speeds[port] != 0.0 || self.connected {
                self.set_speed(port, 0.0);
            }
        }
    }
}

// ============================================================================
// PeripheralPackage - BlockPackage Implementation
// ============================================================================

/// Motor extension package.
pub struct PeripheralPackage {
    motors: Arc<Mutex<Motors>>,
}

impl PeripheralPackage {
    pub fn new(link: Box<dyn MotorLink>) -> Self {
        Self::with_backoff(link, RECONNECT_BACKOFF)
    }

    pub fn with_backoff(
        link: Box<dyn MotorLink>,
        backoff: Duration,
    ) -> Self {
        Self {
            motors: Arc::new(Mutex::new(Motors {
                link,
                connected: false,
                retry_at: None,
                backoff,
                speeds: [0.0; MOTOR_PORTS],
            })),
        }
    }

    /// Last speed requested for `port`.
    pub fn speed(
        &self,
        port: usize,
    ) -> Option<f64> {
        self.motors.lock().speeds.get(port).copied()
    }

    pub fn is_connected(&self) -> bool {
        self.motors.lock().connected
    }
}

impl BlockPackage for PeripheralPackage {
    fn name(&self) -> &'static str {
        "peripheral"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        let set = Arc::clone(&self.motors);
        let stop = Arc::clone(&self.motors);
        let get = Arc::clone(&self.motors);
        vec![
            PrimitiveExport::new(
                "peripheral_setmotorspeed",
                move |args: &BlockArgs, _util: &mut BlockUtility<'_>| -> BlockResult {
                    let port = port_arg(args)?;
                    let speed = args.number("SPEED").clamp(-100.0, 100.0);
                    set.lock().set_speed(port, speed);
                    Ok(Value::Null)
                },
            ),
            PrimitiveExport::new(
                "peripheral_stopmotor",
                move |args: &BlockArgs, _util: &mut BlockUtility<'_>| -> BlockResult {
                    let port = port_arg(args)?;
                    stop.lock().set_speed(port, 0.0);
                    Ok(Value::Null)
                },
            ),
            PrimitiveExport::new(
                "peripheral_getmotorspeed",
                move |args: &BlockArgs, _util: &mut BlockUtility<'_>| -> BlockResult {
                    let port = port_arg(args)?;
                    Ok(cast::number_value(get.lock().speeds[port]))
                },
            ),
        ]
    }

    fn on_event(
        &self,
        event: &RuntimeEvent,
    ) {
        match event {
            RuntimeEvent::ProjectStopAll => self.motors.lock().stop_all(),
            RuntimeEvent::RuntimeDisposed => {
                let mut motors = self.motors.lock();
                if motors.connected {
                    motors.link.disconnect();
                    motors.connected = false;
                }
            }
            _ => {}
        }
    }
}

/// PORT is 1-based in scripts.
fn port_arg(args: &BlockArgs) -> Result<usize, BlockError> {
    let port = args.number("PORT");
    if port.fract() != 0.0 || port < 1.0 || port > MOTOR_PORTS as f64 {
        return Err(BlockError::InvalidArgument {
            name: "PORT".into(),
            reason: format!("expected 1..={}, got {}", MOTOR_PORTS, port),
        });
    }
    Ok(port as usize - 1)
}
