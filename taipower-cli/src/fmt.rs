use std::fmt::{Display, Formatter};

use taipower_tariff::quantities::cost::Cost;

/// Share of a monthly total. Blank when shares were not requested.
#[derive(Copy, Clone, Debug)]
pub struct Share(pub Option<f64>);

impl Display for Share {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            None => Ok(()),
            Some(share) if share > 0.0 && share < 0.0005 => f.write_str("<0.1%"),
            Some(share) => write!(f, "{:.1}%", share * 100.0),
        }
    }
}

/// Bill adjustment with an explicit sign, zero stays unsigned.
#[derive(Copy, Clone, Debug)]
pub struct SignedCost(pub Cost);

impl Display for SignedCost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 > Cost::ZERO {
            write!(f, "+{}", self.0)
        } else {
            Display::fmt(&self.0, f)
        }
    }
}
