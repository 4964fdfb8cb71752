use chrono::{DateTime, Duration, Utc};

/// Estado de un guardián de reintentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownState {
    #[default]
    Idle,
    CooldownUntil(DateTime<Utc>),
}

/// Máquina de estados `{Idle, CooldownUntil(t)}`.
///
/// `try_enter` es la única transición: devuelve `true` y arma el periodo de
/// espera si se puede actuar ahora, `false` si todavía está en cooldown.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    state: CooldownState,
    period: Duration,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            state: CooldownState::Idle,
            period,
        }
    }

    pub fn state(&self) -> CooldownState {
        self.state
    }

    pub fn try_enter(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CooldownState::CooldownUntil(until) if now < until => false,
            _ => {
                self.state = CooldownState::CooldownUntil(now + self.period);
                true
            }
        }
    }

    /// `true` si el guardián ya no bloquea; sirve para purgar guardianes viejos.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            CooldownState::Idle => true,
            CooldownState::CooldownUntil(until) => now >= until,
        }
    }
}
