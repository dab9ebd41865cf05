//! Message bodies for lifecycle notifications

use rust_decimal::Decimal;

use super::OutgoingEmail;
use crate::loan::Decision;

pub fn application_received(to: &str, amount: Decimal) -> OutgoingEmail {
    OutgoingEmail::new(
        to,
        "Loan Application Received and is under review",
        format!(
            "Your loan application for ₦{} has been received and is under review.",
            amount
        ),
        format!(
            "<p>Your loan application for <strong>₦{}</strong> has been received and is under review.</p>",
            amount
        ),
    )
}

pub fn loan_decision(to: &str, decision: Decision, interest_rate: Decimal) -> OutgoingEmail {
    match decision {
        Decision::Approve => OutgoingEmail::new(
            to,
            "Loan Application Approved",
            format!(
                "Your loan application has been approved at an interest rate of {}%.",
                interest_rate
            ),
            format!(
                "<p>Congratulations! Your loan is approved at {}% and will be disbursed shortly.</p>",
                interest_rate
            ),
        ),
        Decision::Reject => OutgoingEmail::new(
            to,
            "Loan Application Rejected",
            "Your loan application has been rejected.",
            "<p>We regret to inform you that your loan application has been rejected. \
             Please contact support for further assistance.</p>",
        ),
    }
}

pub fn repayment_received(to: &str, amount: Decimal, remaining: Decimal) -> OutgoingEmail {
    let (text, html) = if remaining.is_zero() {
        (
            format!(
                "We received your repayment of ₦{}. Your loan is now fully paid off.",
                amount
            ),
            format!(
                "<p>We received your repayment of <strong>₦{}</strong>.</p><p>Your loan is now fully paid off.</p>",
                amount
            ),
        )
    } else {
        (
            format!(
                "We received your repayment of ₦{}. Remaining balance: ₦{}.",
                amount, remaining
            ),
            format!(
                "<p>We received your repayment of <strong>₦{}</strong>.</p><p>Remaining balance: ₦{}</p>",
                amount, remaining
            ),
        )
    };
    OutgoingEmail::new(to, "Repayment Received", text, html)
}

pub fn kyc_decision(to: &str, approved: bool) -> OutgoingEmail {
    if approved {
        OutgoingEmail::new(
            to,
            "KYC Status Update",
            "Your KYC has been approved.",
            "<p>Congratulations! Your KYC has been approved.</p>",
        )
    } else {
        OutgoingEmail::new(
            to,
            "KYC Status Update",
            "Your KYC has been rejected.",
            "<p>Unfortunately, your KYC has been rejected. Please contact support for more details.</p>",
        )
    }
}

pub fn password_reset(to: &str, reset_url: &str) -> OutgoingEmail {
    OutgoingEmail::new(
        to,
        "Password Reset Request",
        format!(
            "Click the link below to reset your password:\n\n{}",
            reset_url
        ),
        format!(
            "<p>Click the link below to reset your password:</p><a href=\"{0}\">{0}</a>",
            reset_url
        ),
    )
}
