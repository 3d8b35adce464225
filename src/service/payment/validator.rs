//! Pre-flight checks for recording a payment.

use crate::error::{Error, Result};
use crate::model::{Citation, CitationStatus, PaymentMethod};
use crate::service::citation::{active_payment, citation_balance, find_citation};
use crate::validate::{normalize_method, normalize_or_number};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;

/// A cashier's request to record a payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    /// Citation id or ticket number
    pub citation: String,
    pub or_number: String,
    /// Defaults to the balance due
    #[serde(default)]
    pub amount: Option<i64>,
    /// Cash handed over; defaults to the amount
    #[serde(default)]
    pub amount_tendered: Option<i64>,
    /// Defaults to cash
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A request that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedPayment {
    pub citation: Citation,
    pub or_number: String,
    pub amount: i64,
    pub amount_tendered: Option<i64>,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

pub struct PaymentValidator<'c> {
    conn: &'c Connection,
}

impl<'c> PaymentValidator<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Normalize an OR number and make sure no payment has ever used it.
    pub fn check_or_unused(&self, or_number: &str) -> Result<String> {
        let or_number = normalize_or_number(or_number).map_err(Error::InvalidArgument)?;
        let used_by: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM payments WHERE or_number = ?1",
                [&or_number],
                |row| row.get(0),
            )
            .optional()?;
        match used_by {
            Some(payment_id) => Err(Error::DuplicateOrNumber { or_number, payment_id }),
            None => Ok(or_number),
        }
    }

    /// Parse a payment method, accepting synonyms.
    pub fn parse_method(method: Option<&str>) -> Result<PaymentMethod> {
        match method.map(str::trim).filter(|m| !m.is_empty()) {
            None => Ok(PaymentMethod::Cash),
            Some(m) => match normalize_method(m) {
                Ok(canonical) => PaymentMethod::parse(&canonical).ok_or_else(|| {
                    Error::InvalidArgument(format!("unknown payment method '{canonical}'"))
                }),
                Err((input, suggestion)) => Err(Error::InvalidArgument(match suggestion {
                    Some(s) => format!("unknown payment method '{input}' (did you mean '{s}'?)"),
                    None => format!(
                        "unknown payment method '{input}' (use cash, check, money_order or online)"
                    ),
                })),
            },
        }
    }

    /// Run every check for a new payment.
    pub fn validate(&self, request: &PaymentRequest) -> Result<ValidatedPayment> {
        let citation = find_citation(self.conn, &request.citation)?;
        if citation.status != CitationStatus::Pending {
            return Err(Error::InvalidStatus(format!(
                "ticket {} is {}; only pending citations can be paid",
                citation.ticket_number,
                citation.status.as_str()
            )));
        }
        if let Some(payment_id) = active_payment(self.conn, &citation.id)? {
            return Err(Error::ActivePaymentExists {
                citation: citation.ticket_number,
                payment_id,
            });
        }

        let (total, paid) = citation_balance(self.conn, &citation.id)?;
        let due = total - paid;
        if due <= 0 {
            return Err(Error::InvalidAmount(format!(
                "nothing is due on ticket {}",
                citation.ticket_number
            )));
        }
        let amount = request.amount.unwrap_or(due);
        if amount != due {
            return Err(Error::InvalidAmount(format!(
                "amount must equal the balance due of {}; partial payments are not accepted",
                crate::format::format_amount(due)
            )));
        }

        let method = Self::parse_method(request.method.as_deref())?;
        let reference_number = request
            .reference_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if method.requires_reference() && reference_number.is_none() {
            return Err(Error::RequiredField("reference_number"));
        }

        let amount_tendered = if method == PaymentMethod::Cash {
            let tendered = request.amount_tendered.unwrap_or(amount);
            if tendered < amount {
                return Err(Error::InvalidAmount(format!(
                    "tendered {} is less than the amount due {}",
                    crate::format::format_amount(tendered),
                    crate::format::format_amount(amount)
                )));
            }
            Some(tendered)
        } else {
            None
        };

        let or_number = self.check_or_unused(&request.or_number)?;

        Ok(ValidatedPayment {
            citation,
            or_number,
            amount,
            amount_tendered,
            method,
            reference_number,
            notes: request
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::citation::tests::new_citation;
    use crate::service::citation::CitationService;
    use crate::service::fines::tests::seed_schedule;
    use crate::storage::SqliteStorage;

    fn setup() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        CitationService::new(&mut storage)
            .create(&new_citation("T-1", 1_000, &["NH"]), "encoder")
            .unwrap();
        storage
    }

    fn request(or_number: &str) -> PaymentRequest {
        PaymentRequest {
            citation: "T-1".into(),
            or_number: or_number.into(),
            ..PaymentRequest::default()
        }
    }

    #[test]
    fn test_defaults_to_full_cash_payment() {
        let storage = setup();
        let validated = PaymentValidator::new(storage.conn())
            .validate(&request("or-0001"))
            .unwrap();
        assert_eq!(validated.or_number, "OR-0001");
        assert_eq!(validated.amount, 100_000);
        assert_eq!(validated.amount_tendered, Some(100_000));
        assert_eq!(validated.method, PaymentMethod::Cash);
    }

    #[test]
    fn test_partial_payment_rejected() {
        let storage = setup();
        let err = PaymentValidator::new(storage.conn())
            .validate(&PaymentRequest {
                amount: Some(50_000),
                ..request("0000001")
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[test]
    fn test_short_tender_rejected() {
        let storage = setup();
        let err = PaymentValidator::new(storage.conn())
            .validate(&PaymentRequest {
                amount_tendered: Some(99_999),
                ..request("0000001")
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[test]
    fn test_non_cash_needs_reference() {
        let storage = setup();
        let validator = PaymentValidator::new(storage.conn());
        let err = validator
            .validate(&PaymentRequest {
                method: Some("cheque".into()),
                ..request("0000001")
            })
            .unwrap_err();
        assert!(matches!(err, Error::RequiredField("reference_number")));

        let ok = validator
            .validate(&PaymentRequest {
                method: Some("gcash".into()),
                reference_number: Some("GC-778812".into()),
                ..request("0000001")
            })
            .unwrap();
        assert_eq!(ok.method, PaymentMethod::Online);
        assert_eq!(ok.amount_tendered, None);
    }

    #[test]
    fn test_malformed_or_and_unknown_method() {
        let storage = setup();
        let validator = PaymentValidator::new(storage.conn());
        assert!(matches!(
            validator.validate(&request("ABCDEF")).unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            validator
                .validate(&PaymentRequest {
                    method: Some("bitcoin".into()),
                    ..request("0000001")
                })
                .unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }
}
