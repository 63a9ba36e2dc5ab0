//! Beneficial owner persistence.

use super::{parse_uuid, VerificationStore};
use crate::case::BeneficialOwner;
use crate::error::VerifyResult;
use crate::types::{CaseId, OwnerId};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl VerificationStore {
    pub fn insert_owner(&self, case_id: CaseId, owner: &BeneficialOwner) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO beneficial_owner (
                owner_id, case_id, party_json, ownership_pct, control_pct,
                is_ubo, sanctions_match, pep_match, risk_score, active, added_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                owner.owner_id.to_string(),
                case_id.to_string(),
                serde_json::to_string(&owner.party)?,
                owner.ownership_pct,
                owner.control_pct,
                owner.is_ubo as i32,
                owner.sanctions_match.map(|b| b as i32),
                owner.pep_match.map(|b| b as i32),
                owner.risk_score,
                owner.active as i32,
                owner.added_at,
            ],
        )?;
        Ok(())
    }

    /// Write back the screening outcome for one owner.
    pub fn update_owner_screening(
        &self,
        owner_id: OwnerId,
        sanctions_match: bool,
        pep_match: bool,
        risk_score: f64,
    ) -> VerifyResult<()> {
        self.conn.execute(
            "UPDATE beneficial_owner
             SET sanctions_match = ?2, pep_match = ?3, risk_score = ?4
             WHERE owner_id = ?1",
            params![
                owner_id.to_string(),
                sanctions_match as i32,
                pep_match as i32,
                risk_score,
            ],
        )?;
        Ok(())
    }

    pub fn owners_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<BeneficialOwner>> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, party_json, ownership_pct, control_pct, is_ubo,
                    sanctions_match, pep_match, risk_score, active, added_at
             FROM beneficial_owner WHERE case_id = ?1
             ORDER BY added_at ASC, owner_id ASC",
        )?;
        let rows = stmt
            .query_map(params![case_id.to_string()], |row| {
                Ok(OwnerRow {
                    owner_id: row.get(0)?,
                    party_json: row.get(1)?,
                    ownership_pct: row.get(2)?,
                    control_pct: row.get::<_, f64>(3)?,
                    is_ubo: row.get::<_, i32>(4)? != 0,
                    sanctions_match: row.get::<_, Option<i32>>(5)?.map(|v| v != 0),
                    pep_match: row.get::<_, Option<i32>>(6)?.map(|v| v != 0),
                    risk_score: row.get(7)?,
                    active: row.get::<_, i32>(8)? != 0,
                    added_at: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|r| {
                Ok(BeneficialOwner {
                    owner_id: parse_uuid(&r.owner_id)?,
                    party: serde_json::from_str(&r.party_json)?,
                    ownership_pct: r.ownership_pct,
                    control_pct: r.control_pct,
                    is_ubo: r.is_ubo,
                    sanctions_match: r.sanctions_match,
                    pep_match: r.pep_match,
                    risk_score: r.risk_score,
                    active: r.active,
                    added_at: r.added_at,
                })
            })
            .collect()
    }
}

struct OwnerRow {
    owner_id: String,
    party_json: String,
    ownership_pct: f64,
    control_pct: f64,
    is_ubo: bool,
    sanctions_match: Option<bool>,
    pep_match: Option<bool>,
    risk_score: Option<f64>,
    active: bool,
    added_at: DateTime<Utc>,
}
