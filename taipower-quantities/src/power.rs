use std::{
    fmt::{Debug, Display, Formatter},
    ops::Mul,
};

use crate::{Quantity, cost::Cost, rate::KilowattRate};

pub type Kilowatts = Quantity<1, 0, 0>;

impl Display for Kilowatts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} kW", self.0)
    }
}

impl Debug for Kilowatts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}kW", self.0)
    }
}

impl Mul<KilowattRate> for Kilowatts {
    type Output = Cost;

    fn mul(self, rhs: KilowattRate) -> Self::Output {
        Quantity(self.0 * rhs.0)
    }
}
