//! Token record checks

use super::{RecordCheck, RecordField, check_fields};
use crate::access::{DiffRecordAccess, RecordAccess};
use crate::engine::{CheckerEngine, ConsistencyRecord, PendingCheck, ReferenceCheck};
use crate::error::Result;
use crate::report::{Inconsistency, RecordKind, TokenViolation};
use nexus_record::{NONE, TokenKind, TokenRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    /// Head of the token's name chain
    Name(u64),
}

impl ReferenceCheck<TokenRecord> for TokenCheck {
    fn target(&self, token: TokenKind) -> (RecordKind, u64) {
        match self {
            TokenCheck::Name(id) => (RecordKind::Dynamic(token.name_store()), *id),
        }
    }

    fn resolve(
        &self,
        engine: &mut CheckerEngine<'_, TokenRecord>,
        records: &dyn RecordAccess,
    ) -> Result<()> {
        match self {
            TokenCheck::Name(id) => {
                let name = records.dynamic(engine.context().name_store(), *id)?;
                if !name.in_use {
                    engine.report(TokenViolation::NameBlockNotInUse(name));
                } else if name.length == 0 {
                    engine.report(TokenViolation::EmptyName(name));
                }
            }
        }
        Ok(())
    }
}

struct TokenName;

impl RecordField<TokenRecord> for TokenName {
    fn check_consistency(&self, record: &TokenRecord, engine: &mut CheckerEngine<'_, TokenRecord>) {
        if record.name_id != NONE {
            engine.comparative_check(TokenCheck::Name(record.name_id));
        }
    }
}

impl ConsistencyRecord for TokenRecord {
    type Context = TokenKind;
    type Violation = TokenViolation;
    type Check = TokenCheck;

    fn inconsistency(token: TokenKind, record: Self, violation: TokenViolation) -> Inconsistency {
        Inconsistency::Token {
            token,
            record,
            violation,
        }
    }

    fn pending(token: TokenKind, record: Self, check: TokenCheck) -> PendingCheck {
        PendingCheck::Token {
            token,
            record,
            check,
        }
    }
}

/// Checker for one token store
pub struct TokenRecordCheck {
    kind: TokenKind,
    fields: Vec<Box<dyn RecordField<TokenRecord>>>,
}

impl TokenRecordCheck {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            fields: vec![Box::new(TokenName)],
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl RecordCheck<TokenRecord> for TokenRecordCheck {
    fn check(
        &self,
        record: &TokenRecord,
        engine: &mut CheckerEngine<'_, TokenRecord>,
        _records: &dyn RecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, record, engine);
        Ok(())
    }

    fn check_change(
        &self,
        _old: &TokenRecord,
        new: &TokenRecord,
        engine: &mut CheckerEngine<'_, TokenRecord>,
        _records: &dyn DiffRecordAccess,
    ) -> Result<()> {
        check_fields(&self.fields, new, engine);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::check_record;
    use nexus_record::DynamicStoreKind;
    use nexus_record::testing::StoreBuilder;

    #[test]
    fn test_token_names() {
        let mut builder = StoreBuilder::new();
        let key = builder.property_key("name") as u64;
        let checker = TokenRecordCheck::new(TokenKind::PropertyKey);
        let token = builder.token(TokenKind::PropertyKey, key);
        assert!(check_record(&builder, &checker, TokenKind::PropertyKey, &token).is_empty());

        let names = builder.stores().dynamic(DynamicStoreKind::PropertyKeyName);
        names.update(token.name_id, |r| r.length = 0);
        let report = check_record(&builder, &checker, TokenKind::PropertyKey, &token);
        assert_eq!(report.count("empty_name"), 1);

        names.update(token.name_id, |r| r.in_use = false);
        let report = check_record(&builder, &checker, TokenKind::PropertyKey, &token);
        assert_eq!(report.count("name_block_not_in_use"), 1);
    }

    #[test]
    fn test_name_is_read_from_the_kind_store() {
        let mut builder = StoreBuilder::new();
        let label = builder.label("Person") as u64;
        let token = builder.token(TokenKind::Label, label);
        let check = TokenCheck::Name(token.name_id);
        assert_eq!(
            check.target(TokenKind::Label),
            (RecordKind::Dynamic(DynamicStoreKind::LabelName), token.name_id)
        );
        let report = check_record(&builder, &TokenRecordCheck::new(TokenKind::Label), TokenKind::Label, &token);
        assert!(report.is_empty());
    }
}
