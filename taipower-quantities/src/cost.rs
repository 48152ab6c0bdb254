use std::fmt::{Debug, Display, Formatter};

use crate::Quantity;

/// New Taiwan dollars.
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    /// Round half away from zero to whole cents.
    pub fn round_cents(self) -> Self {
        Self::new((self.get() * 100.0).round() / 100.0)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} TWD", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}TWD", self.0)
    }
}
