// Fee & Tax Assembler
//
// Adds the flat fees, the platform service fee and tax on top of the discounted
// subtotal, and carries the security deposit alongside.

use rust_decimal::Decimal;

use crate::pricing::{
    error::QuoteError,
    models::StayFees,
    price_calculator::PriceCalculator,
};

/// Fee and tax lines of a quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeLines {
    pub cleaning_fee: Decimal,
    pub extra_guest_fee: Decimal,
    pub pet_fee: Decimal,
    pub service_fee_rate: Decimal,
    pub service_fee: Decimal,
    pub total_before_tax: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub security_deposit: Decimal,
    pub security_deposit_refundable: bool,
}

pub struct FeeAssembler;

impl FeeAssembler {
    /// Assemble fees and tax for a stay
    ///
    /// # Arguments
    /// * `discounted_subtotal` - Nightly subtotal after discounts
    /// * `guests` - Number of guests
    /// * `pets` - Number of pets
    /// * `fees` - Listing fee configuration
    /// * `service_fee_rate` - Platform service fee for the listing's category, in percent
    ///
    /// # Errors
    /// `PetsNotAllowed` when pets are requested on a listing without a pet fee,
    /// `InvariantViolation` when any line comes out negative.
    pub fn assemble(
        discounted_subtotal: Decimal,
        guests: u32,
        pets: u32,
        fees: &StayFees,
        service_fee_rate: Decimal,
    ) -> Result<FeeLines, QuoteError> {
        let cleaning_fee = PriceCalculator::round(fees.cleaning_fee);

        // Flat once per booking, not per night
        let extra_guest_fee = match &fees.extra_guest {
            Some(extra) => {
                let extra_guests = guests.saturating_sub(extra.threshold);
                PriceCalculator::round(extra.per_guest * Decimal::from(extra_guests))
            }
            None => Decimal::ZERO,
        };

        let pet_fee = if pets > 0 {
            match fees.pet_fee {
                Some(fee) => PriceCalculator::round(fee),
                None => return Err(QuoteError::PetsNotAllowed),
            }
        } else {
            Decimal::ZERO
        };

        let service_fee = PriceCalculator::percent_of(discounted_subtotal, service_fee_rate);
        let total_before_tax = PriceCalculator::calculate_total(&[
            discounted_subtotal,
            cleaning_fee,
            extra_guest_fee,
            pet_fee,
            service_fee,
        ]);

        let tax_rate = fees.tax_rate.unwrap_or(Decimal::ZERO);
        let tax_amount = PriceCalculator::percent_of(total_before_tax, tax_rate);

        let (security_deposit, security_deposit_refundable) = match &fees.security_deposit {
            Some(deposit) => (PriceCalculator::round(deposit.amount), deposit.refundable),
            None => (Decimal::ZERO, true),
        };

        let lines = FeeLines {
            cleaning_fee,
            extra_guest_fee,
            pet_fee,
            service_fee_rate,
            service_fee,
            total_before_tax,
            tax_rate,
            tax_amount,
            security_deposit,
            security_deposit_refundable,
        };
        lines.check_non_negative()?;

        Ok(lines)
    }
}

impl FeeLines {
    fn check_non_negative(&self) -> Result<(), QuoteError> {
        let lines = [
            ("cleaning_fee", self.cleaning_fee),
            ("extra_guest_fee", self.extra_guest_fee),
            ("pet_fee", self.pet_fee),
            ("service_fee_rate", self.service_fee_rate),
            ("service_fee", self.service_fee),
            ("tax_rate", self.tax_rate),
            ("tax_amount", self.tax_amount),
            ("security_deposit", self.security_deposit),
        ];
        match lines.iter().find(|(_, amount)| *amount < Decimal::ZERO) {
            Some((field, amount)) => {
                tracing::error!(field, %amount, "Negative fee line computed");
                Err(QuoteError::InvariantViolation(format!(
                    "{} is negative: {}",
                    field, amount
                )))
            }
            None => Ok(()),
        }
    }
}
