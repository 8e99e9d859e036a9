use serde::{Deserialize, Serialize};

use crate::{canonical, ContractError, EncodeError};

/// Ledger entity stored under `id.to_string()`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub name: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Record {
    pub fn new(id: u64, name: impl Into<String>, amount: i64, note: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            amount,
            note,
        }
    }

    /// Builds a record from the positional text arguments of a transaction.
    pub fn from_args(
        id: &str,
        name: &str,
        amount: &str,
        note: Option<&str>,
    ) -> Result<Self, ContractError> {
        let id = parse_id(id)?;
        if name.is_empty() {
            return Err(ContractError::malformed("name", name, "must not be empty"));
        }
        let amount = amount
            .parse::<i64>()
            .map_err(|e| ContractError::malformed("amount", amount, e))?;
        Ok(Self::new(id, name, amount, note.map(str::to_string)))
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        canonical::to_canonical_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Parses a record id: unsigned decimal, strictly positive.
pub fn parse_id(raw: &str) -> Result<u64, ContractError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ContractError::malformed("id", raw, "expected decimal digits only"));
    }
    let id = raw
        .parse::<u64>()
        .map_err(|e| ContractError::malformed("id", raw, e))?;
    if id == 0 {
        return Err(ContractError::malformed("id", raw, "must be positive"));
    }
    Ok(id)
}

/// Store key for a textual id. `"007"` and `"7"` share a key.
pub fn record_key(raw: &str) -> Result<String, ContractError> {
    parse_id(raw).map(|id| id.to_string())
}

/// Records written by `InitLedger`.
pub fn seed_records() -> [Record; 2] {
    [
        Record::new(1, "test01", 30, None),
        Record::new(2, "test02", 40, None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_omits_missing_note_and_sorts_fields() {
        let record = Record::new(3, "appUser3", 100, None);
        assert_eq!(
            String::from_utf8(record.encode().unwrap()).unwrap(),
            r#"{"amount":100,"id":3,"name":"appUser3"}"#
        );
        let noted = Record::new(3, "appUser3", 100, Some("add".into()));
        assert_eq!(
            String::from_utf8(noted.encode().unwrap()).unwrap(),
            r#"{"amount":100,"id":3,"name":"appUser3","note":"add"}"#
        );
    }

    #[test]
    fn from_args_parses_numeric_text() {
        let record = Record::from_args("12", "bob", "-40", Some("refund")).unwrap();
        assert_eq!(record, Record::new(12, "bob", -40, Some("refund".into())));
        assert_eq!(record.key(), "12");
    }

    #[test]
    fn malformed_numbers_name_the_field() {
        for (id, amount, field) in [
            ("abc", "1", "id"),
            ("0", "1", "id"),
            ("-3", "1", "id"),
            ("+3", "1", "id"),
            ("", "1", "id"),
            (" 4", "1", "id"),
            ("4", "1.5", "amount"),
            ("4", "12abc", "amount"),
        ] {
            match Record::from_args(id, "n", amount, None).unwrap_err() {
                ContractError::MalformedInput { field: f, .. } => assert_eq!(f, field),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn empty_name_is_malformed() {
        let err = Record::from_args("1", "", "1", None).unwrap_err();
        assert!(matches!(
            err,
            ContractError::MalformedInput { field: "name", .. }
        ));
    }

    #[test]
    fn keys_are_normalised() {
        assert_eq!(record_key("007").unwrap(), "7");
        assert!(record_key("").is_err());
        assert!(record_key("+5").is_err());
    }

    #[test]
    fn decode_accepts_fields_in_any_order() {
        let decoded =
            Record::decode(br#"{"name":"x","note":"n","amount":5,"id":9}"#).unwrap();
        assert_eq!(decoded, Record::new(9, "x", 5, Some("n".into())));
    }
}
