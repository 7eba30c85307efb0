//! Amortized infrastructure debt.
//!
//! Every buildable source carries one unissued bond per owning utility.
//! When construction is triggered the utility issues its bond: the level
//! annual payment is computed from the (multiplier-scaled) principal, term,
//! and rate, and payments fall due on the first week of each fiscal year
//! once construction time has elapsed.
//!
//! Variable-interest bonds back jointly owned treatment plants whose
//! capacity shares drift over time; their annual payment is rescaled from
//! the utility's current allocated treatment fraction before each payment.

use serde::{Deserialize, Serialize};

use crate::config::{is_first_week_of_year, WEEKS_IN_YEAR};

/// How the annual debt service behaves over the bond's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondKind {
    /// Constant level payment.
    Fixed,
    /// Level payment rescaled by the utility's current allocated treatment
    /// fraction of the financed source.
    VariableInterest,
}

/// One utility's amortizing liability for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bond {
    pub source_id: usize,
    pub utility_id: usize,
    pub kind: BondKind,
    /// Capital cost share financed by this bond.
    pub principal: f64,
    /// Repayment term in years before multiplier scaling.
    pub term_years: f64,
    /// Annual coupon rate before multiplier scaling.
    pub interest_rate: f64,

    issued: bool,
    week_issued: usize,
    first_payment_week: usize,
    scaled_rate: f64,
    n_payments: u32,
    payments_made: u32,
    /// Level payment on the full principal, before allocation scaling.
    base_level_payment: f64,
    /// Payment actually charged; differs from the base only for
    /// variable-interest bonds.
    level_payment: f64,
}

/// Level annual payment for a principal amortized over `n` years at `rate`.
fn level_payment(principal: f64, rate: f64, n: f64) -> f64 {
    if rate > 0.0 {
        principal * rate / (1.0 - (1.0 + rate).powf(-n))
    } else {
        principal / n
    }
}

impl Bond {
    pub fn new(
        source_id: usize,
        utility_id: usize,
        kind: BondKind,
        principal: f64,
        term_years: f64,
        interest_rate: f64,
    ) -> Self {
        Self {
            source_id,
            utility_id,
            kind,
            principal,
            term_years,
            interest_rate,
            issued: false,
            week_issued: 0,
            first_payment_week: 0,
            scaled_rate: 0.0,
            n_payments: 0,
            payments_made: 0,
            base_level_payment: 0.0,
            level_payment: 0.0,
        }
    }

    /// Issue the bond in `week`. Payments begin once construction finishes
    /// and recur annually for the scaled term. Re-issuing an already issued
    /// bond is a no-op.
    pub fn issue(
        &mut self,
        week: usize,
        construction_time: usize,
        term_multiplier: f64,
        interest_rate_multiplier: f64,
    ) {
        if self.issued {
            return;
        }
        self.issued = true;
        self.week_issued = week;
        self.first_payment_week = week + construction_time;
        self.scaled_rate = self.interest_rate * interest_rate_multiplier;
        let n = (self.term_years * term_multiplier).round().max(1.0);
        self.n_payments = n as u32;
        self.base_level_payment = level_payment(self.principal, self.scaled_rate, n);
        self.level_payment = self.base_level_payment;
    }

    pub fn is_issued(&self) -> bool {
        self.issued
    }

    /// Whether a payment falls due in `week`: issued, construction over,
    /// payments remaining, and a fiscal-year boundary.
    pub fn due(&self, week: usize) -> bool {
        self.issued
            && week >= self.first_payment_week
            && self.payments_made < self.n_payments
            && is_first_week_of_year(week)
    }

    /// Annual payment due in `week`, advancing the payment counter.
    /// Returns 0 outside the repayment window.
    pub fn debt_service(&mut self, week: usize) -> f64 {
        if self.due(week) {
            self.payments_made += 1;
            self.level_payment
        } else {
            0.0
        }
    }

    /// The payment due in `week` discounted back to issuance. Read this
    /// before [`Bond::debt_service`] advances the counter for the week.
    pub fn present_value_debt_service(&self, week: usize, discount_rate: f64) -> f64 {
        if !self.due(week) {
            return 0.0;
        }
        let years = (week - self.week_issued) as f64 / WEEKS_IN_YEAR;
        self.level_payment / (1.0 + discount_rate).powf(years)
    }

    /// Rescale the annual payment from the utility's current allocated
    /// treatment fraction. Only meaningful for variable-interest bonds.
    pub fn set_debt_service(&mut self, allocated_treatment_fraction: f64) {
        self.level_payment = self.base_level_payment * allocated_treatment_fraction;
    }

    /// Present value of the whole payment stream at issuance, discounting
    /// the repayment annuity back through the construction delay.
    pub fn net_present_value_at_issuance(&self, discount_rate: f64) -> f64 {
        if !self.issued || self.n_payments == 0 {
            return 0.0;
        }
        let n = f64::from(self.n_payments);
        let annuity = if discount_rate > 0.0 {
            self.level_payment * (1.0 - (1.0 + discount_rate).powf(-n)) / discount_rate
        } else {
            self.level_payment * n
        };
        let construction_years =
            (self.first_payment_week - self.week_issued) as f64 / WEEKS_IN_YEAR;
        annuity / (1.0 + discount_rate).powf(construction_years)
    }
}
