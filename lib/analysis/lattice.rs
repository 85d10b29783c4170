//! The relational security lattice.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The security of one side of a value.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum SecurityPoint {
    Low,
    High,
    Bot,
    Top,
}

impl SecurityPoint {
    /// `Bot` is the identity, `Top` absorbs, and `High` dominates `Low`.
    pub fn join(self, other: SecurityPoint) -> SecurityPoint {
        match (self, other) {
            (SecurityPoint::Bot, point) | (point, SecurityPoint::Bot) => point,
            (SecurityPoint::Top, _) | (_, SecurityPoint::Top) => SecurityPoint::Top,
            (SecurityPoint::Low, SecurityPoint::Low) => SecurityPoint::Low,
            _ => SecurityPoint::High,
        }
    }

    /// Anything that does not resolve to `Low`.
    pub fn is_high_like(self) -> bool {
        self != SecurityPoint::Low
    }
}

impl FromStr for SecurityPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<SecurityPoint, Error> {
        match s {
            "Low" => Ok(SecurityPoint::Low),
            "High" => Ok(SecurityPoint::High),
            "Bot" => Ok(SecurityPoint::Bot),
            "Top" => Ok(SecurityPoint::Top),
            _ => Err(Error::UnknownOption(s.to_string())),
        }
    }
}

impl fmt::Display for SecurityPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SecurityPoint::Low => write!(f, "Low"),
            SecurityPoint::High => write!(f, "High"),
            SecurityPoint::Bot => write!(f, "Bot"),
            SecurityPoint::Top => write!(f, "Top"),
        }
    }
}

/// The six-point lattice observations and relations live in.
///
/// `EqHigh` and `Diverge` are incomparable. `Leak` is a violation, and so is
/// `Top`, which means nothing can be said.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum LatticeValue {
    Bot,
    EqLow,
    EqHigh,
    Diverge,
    Leak,
    Top,
}

use self::LatticeValue::*;

const JOIN: [[LatticeValue; 6]; 6] = [
    // Bot
    [Bot, EqLow, EqHigh, Diverge, Leak, Top],
    // EqLow
    [EqLow, EqLow, EqHigh, Diverge, Leak, Top],
    // EqHigh
    [EqHigh, EqHigh, EqHigh, Top, Top, Top],
    // Diverge
    [Diverge, Diverge, Top, Diverge, Top, Top],
    // Leak
    [Leak, Leak, Top, Top, Leak, Top],
    // Top
    [Top, Top, Top, Top, Top, Top],
];

impl LatticeValue {
    pub const ALL: [LatticeValue; 6] = [Bot, EqLow, EqHigh, Diverge, Leak, Top];

    fn row(self) -> usize {
        match self {
            Bot => 0,
            EqLow => 1,
            EqHigh => 2,
            Diverge => 3,
            Leak => 4,
            Top => 5,
        }
    }

    pub fn join(self, other: LatticeValue) -> LatticeValue {
        JOIN[self.row()][other.row()]
    }

    /// True for values that witness a violation when observed.
    pub fn is_violation(self) -> bool {
        matches!(self, Leak | Top)
    }
}

impl fmt::Display for LatticeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Bot => "Bot",
            EqLow => "EqLow",
            EqHigh => "EqHigh",
            Diverge => "Diverge",
            Leak => "Leak",
            Top => "Top",
        };
        write!(f, "{}", name)
    }
}

/// Relate the committed and speculative security of a value.
pub fn derive_relation(ns: SecurityPoint, sp: SecurityPoint) -> LatticeValue {
    match (ns, sp) {
        (SecurityPoint::Bot, _) | (_, SecurityPoint::Bot) => Bot,
        (SecurityPoint::Top, _) | (_, SecurityPoint::Top) => Top,
        (SecurityPoint::High, SecurityPoint::High) => EqHigh,
        (SecurityPoint::Low, SecurityPoint::Low) => EqLow,
        (SecurityPoint::Low, SecurityPoint::High) | (SecurityPoint::High, SecurityPoint::Low) => {
            Leak
        }
    }
}

/// A value as seen by committed (`ns`) and speculative (`sp`) execution.
///
/// `rel` is always `derive_relation(ns, sp)`. It is only ever computed by the
/// constructor and setters.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(from = "RelValueWire")]
pub struct RelValue {
    ns: SecurityPoint,
    sp: SecurityPoint,
    rel: LatticeValue,
}

#[derive(Deserialize)]
struct RelValueWire {
    ns: SecurityPoint,
    sp: SecurityPoint,
}

impl From<RelValueWire> for RelValue {
    fn from(wire: RelValueWire) -> RelValue {
        RelValue::new(wire.ns, wire.sp)
    }
}

impl RelValue {
    pub fn new(ns: SecurityPoint, sp: SecurityPoint) -> RelValue {
        RelValue {
            ns,
            sp,
            rel: derive_relation(ns, sp),
        }
    }

    /// The same point on both sides.
    pub fn uniform(point: SecurityPoint) -> RelValue {
        RelValue::new(point, point)
    }

    pub fn low() -> RelValue {
        RelValue::uniform(SecurityPoint::Low)
    }

    pub fn high() -> RelValue {
        RelValue::uniform(SecurityPoint::High)
    }

    pub fn ns(&self) -> SecurityPoint {
        self.ns
    }

    pub fn sp(&self) -> SecurityPoint {
        self.sp
    }

    pub fn rel(&self) -> LatticeValue {
        self.rel
    }

    pub fn set_ns(&mut self, ns: SecurityPoint) {
        self.ns = ns;
        self.rel = derive_relation(self.ns, self.sp);
    }

    pub fn set_sp(&mut self, sp: SecurityPoint) {
        self.sp = sp;
        self.rel = derive_relation(self.ns, self.sp);
    }

    /// Join each side independently.
    pub fn join(&self, other: &RelValue) -> RelValue {
        RelValue::new(self.ns.join(other.ns), self.sp.join(other.sp))
    }
}

impl fmt::Display for RelValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}) {}", self.ns, self.sp, self.rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: [SecurityPoint; 4] = [
        SecurityPoint::Low,
        SecurityPoint::High,
        SecurityPoint::Bot,
        SecurityPoint::Top,
    ];

    #[test]
    fn join_is_idempotent_and_commutative() {
        for a in LatticeValue::ALL.iter() {
            assert_eq!(a.join(*a), *a);
            for b in LatticeValue::ALL.iter() {
                assert_eq!(a.join(*b), b.join(*a), "{} {}", a, b);
            }
        }
    }

    #[test]
    fn join_table() {
        assert_eq!(Bot.join(Leak), Leak);
        assert_eq!(EqLow.join(EqHigh), EqHigh);
        assert_eq!(EqHigh.join(Diverge), Top);
        assert_eq!(EqHigh.join(Leak), Top);
        assert_eq!(Diverge.join(EqLow), Diverge);
        assert_eq!(Leak.join(Diverge), Top);
        assert_eq!(Top.join(Bot), Top);
    }

    #[test]
    fn bot_is_identity_and_top_absorbs() {
        for a in LatticeValue::ALL.iter() {
            assert_eq!(Bot.join(*a), *a);
            assert_eq!(Top.join(*a), Top);
        }
    }

    #[test]
    fn relation_table() {
        assert_eq!(derive_relation(SecurityPoint::Low, SecurityPoint::Low), EqLow);
        assert_eq!(derive_relation(SecurityPoint::High, SecurityPoint::High), EqHigh);
        assert_eq!(derive_relation(SecurityPoint::Low, SecurityPoint::High), Leak);
        assert_eq!(derive_relation(SecurityPoint::High, SecurityPoint::Low), Leak);
        assert_eq!(derive_relation(SecurityPoint::Bot, SecurityPoint::Top), Bot);
        assert_eq!(derive_relation(SecurityPoint::Top, SecurityPoint::Low), Top);
    }

    #[test]
    fn relation_follows_mutation() {
        for ns in POINTS.iter() {
            for sp in POINTS.iter() {
                let mut value = RelValue::low();
                value.set_ns(*ns);
                value.set_sp(*sp);
                assert_eq!(value.rel(), derive_relation(*ns, *sp));
                assert_eq!(value, RelValue::new(*ns, *sp));
            }
        }
    }

    #[test]
    fn point_join() {
        assert_eq!(SecurityPoint::Low.join(SecurityPoint::High), SecurityPoint::High);
        assert_eq!(SecurityPoint::Bot.join(SecurityPoint::Low), SecurityPoint::Low);
        assert_eq!(SecurityPoint::High.join(SecurityPoint::Top), SecurityPoint::Top);
        assert!(SecurityPoint::Bot.is_high_like());
        assert!(!SecurityPoint::Low.is_high_like());
    }

    #[test]
    fn rel_is_rederived_on_deserialize() {
        let value: RelValue =
            serde_json::from_str(r#"{"ns": "Low", "sp": "High", "rel": "EqLow"}"#).unwrap();
        assert_eq!(value.rel(), Leak);
    }
}
