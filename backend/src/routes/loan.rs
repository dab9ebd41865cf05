//! Loan route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::loan;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/loans", get(loan::list_applications))
        .route("/loans/apply", post(loan::apply_loan))
        .route("/loans/:id", get(loan::get_loan))
        .route("/loans/:id/approve", patch(loan::approve_loan))
        .route("/loans/:id/repay", post(loan::repay_loan))
        .route("/loans/history/:user_id", get(loan::loan_history))
        .route("/loans/history/grouped/:user_id", get(loan::grouped_history))
        .route("/loans/user/:user_id", get(loan::loans_by_user))
        .route("/loans/category/:category", get(loan::loans_by_category))
        .route("/loans/stats/category", get(loan::category_stats))
        .route("/loans/stats/user-total/:user_id", get(loan::user_total))
        .route("/loans/transactions/:user_id", get(loan::credit_summary))
        .route(
            "/loans/repayment/history/:loan_id",
            get(loan::repayment_history),
        )
        .route("/loans/schedule/:user_id", get(loan::repayment_schedule))
        .route("/loans/approved/:user_id", get(loan::active_loan))
}
