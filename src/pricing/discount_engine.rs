// Discount Engine
//
// Selects at most one pricing rule per discount type and stacks the chosen
// percentages additively on the pre-discount subtotal.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Reverse;

use crate::pricing::{
    models::{AppliedDiscount, DiscountType, PricingRule},
    price_calculator::PriceCalculator,
};

/// Facts about the stay that rule conditions are evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountContext {
    pub nights: u32,
    /// Days between the booking-creation date and check-in
    pub lead_days: i64,
    /// Booking-creation date; rule windows are matched against it
    pub booked_on: NaiveDate,
}

/// Discounts chosen for a stay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountOutcome {
    pub discounts: Vec<AppliedDiscount>,
    pub savings: Decimal,
}

pub struct DiscountEngine;

impl DiscountEngine {
    /// Apply the best rule of each type to `subtotal`
    ///
    /// Percentages add up (never compound) and are capped at 100%. Amounts are
    /// itemised with cumulative rounding so their sum is exactly
    /// `round(subtotal * total_percent / 100)`.
    pub fn apply(subtotal: Decimal, rules: &[PricingRule], ctx: &DiscountContext) -> DiscountOutcome {
        let mut discounts = Vec::new();
        let mut stacked_percent = Decimal::ZERO;
        let mut savings = Decimal::ZERO;

        for discount_type in DiscountType::ALL {
            let Some(rule) = Self::select_rule(discount_type, rules, ctx) else {
                continue;
            };

            let remaining = Decimal::ONE_HUNDRED - stacked_percent;
            if remaining <= Decimal::ZERO {
                tracing::warn!(
                    rule_id = %rule.id,
                    %discount_type,
                    "Discount skipped, stacked percentages already reach 100%"
                );
                continue;
            }
            let percent = if rule.discount_percent > remaining {
                tracing::warn!(
                    rule_id = %rule.id,
                    %discount_type,
                    requested = %rule.discount_percent,
                    applied = %remaining,
                    "Discount capped so stacked percentages do not exceed 100%"
                );
                remaining
            } else {
                rule.discount_percent
            };

            stacked_percent += percent;
            let cumulative = PriceCalculator::percent_of(subtotal, stacked_percent);
            let amount = cumulative - savings;
            savings = cumulative;

            discounts.push(AppliedDiscount {
                rule_id: rule.id,
                discount_type,
                percent,
                amount,
            });
        }

        DiscountOutcome { discounts, savings }
    }

    /// Best eligible rule of one type, if any
    ///
    /// - length_of_stay: highest `min_nights` met
    /// - early_bird: highest `min_days_before_checkin` met
    /// - last_minute: lowest `max_days_before_checkin` met
    /// - promotional: highest percent
    ///
    /// Ties go to the higher percent, then the lower rule id.
    pub fn select_rule<'a>(
        discount_type: DiscountType,
        rules: &'a [PricingRule],
        ctx: &DiscountContext,
    ) -> Option<&'a PricingRule> {
        rules
            .iter()
            .filter(|rule| rule.rule_type == discount_type)
            .filter(|rule| Self::is_eligible(rule, ctx))
            .max_by_key(|rule| (Self::specificity(rule), rule.discount_percent, Reverse(rule.id)))
    }

    /// Whether a rule is active, in window, well-formed and its conditions hold
    pub fn is_eligible(rule: &PricingRule, ctx: &DiscountContext) -> bool {
        if !rule.is_active {
            return false;
        }

        if rule.discount_percent <= Decimal::ZERO || rule.discount_percent > Decimal::ONE_HUNDRED {
            tracing::warn!(
                rule_id = %rule.id,
                percent = %rule.discount_percent,
                "Skipping pricing rule with a percent outside (0, 100]"
            );
            return false;
        }

        if rule.start_date.is_some_and(|start| ctx.booked_on < start) {
            return false;
        }
        if rule.end_date.is_some_and(|end| ctx.booked_on > end) {
            return false;
        }

        let conditions = &rule.conditions;
        if conditions.min_nights.is_some_and(|min| ctx.nights < min) {
            return false;
        }
        if conditions
            .min_days_before_checkin
            .is_some_and(|min| ctx.lead_days < min)
        {
            return false;
        }
        if conditions
            .max_days_before_checkin
            .is_some_and(|max| ctx.lead_days > max)
        {
            return false;
        }

        true
    }

    fn specificity(rule: &PricingRule) -> i64 {
        let conditions = &rule.conditions;
        match rule.rule_type {
            DiscountType::LengthOfStay => conditions.min_nights.map(i64::from).unwrap_or(0),
            DiscountType::EarlyBird => conditions.min_days_before_checkin.unwrap_or(0),
            // Tighter last-minute windows are more specific
            DiscountType::LastMinute => -conditions.max_days_before_checkin.unwrap_or(i64::MAX),
            DiscountType::Promotional => 0,
        }
    }
}
