//! Document persistence.

use super::{parse_uuid, VerificationStore};
use crate::case::{Document, DocumentSide, DocumentType};
use crate::error::VerifyResult;
use crate::types::CaseId;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::str::FromStr;

impl VerificationStore {
    pub fn insert_document(&self, case_id: CaseId, doc: &Document) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO case_document (
                document_id, case_id, doc_type, side, file_name, mime_type,
                storage_ref, quality_json, fraud_json, extracted_json,
                ocr_confidence, submitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                doc.document_id.to_string(),
                case_id.to_string(),
                doc.doc_type.as_str(),
                doc.side.as_str(),
                doc.file_name,
                doc.mime_type,
                doc.storage_ref,
                serde_json::to_string(&doc.quality)?,
                serde_json::to_string(&doc.fraud)?,
                doc.extracted_fields
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                doc.ocr_confidence,
                doc.submitted_at,
            ],
        )?;
        Ok(())
    }

    pub fn documents_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, doc_type, side, file_name, mime_type, storage_ref,
                    quality_json, fraud_json, extracted_json, ocr_confidence, submitted_at
             FROM case_document WHERE case_id = ?1
             ORDER BY submitted_at ASC, document_id ASC",
        )?;
        let rows = stmt
            .query_map(params![case_id.to_string()], |row| {
                Ok(DocumentRow {
                    document_id: row.get(0)?,
                    doc_type: row.get(1)?,
                    side: row.get(2)?,
                    file_name: row.get(3)?,
                    mime_type: row.get(4)?,
                    storage_ref: row.get(5)?,
                    quality_json: row.get(6)?,
                    fraud_json: row.get(7)?,
                    extracted_json: row.get(8)?,
                    ocr_confidence: row.get(9)?,
                    submitted_at: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|r| r.into_document()).collect()
    }
}

struct DocumentRow {
    document_id: String,
    doc_type: String,
    side: String,
    file_name: String,
    mime_type: String,
    storage_ref: String,
    quality_json: String,
    fraud_json: String,
    extracted_json: Option<String>,
    ocr_confidence: Option<f64>,
    submitted_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self) -> VerifyResult<Document> {
        Ok(Document {
            document_id: parse_uuid(&self.document_id)?,
            doc_type: DocumentType::from_str(&self.doc_type)
                .map_err(|e| crate::error::VerifyError::Config(e.to_string()))?,
            side: DocumentSide::from_str(&self.side)
                .map_err(|e| crate::error::VerifyError::Config(e.to_string()))?,
            file_name: self.file_name,
            mime_type: self.mime_type,
            storage_ref: self.storage_ref,
            quality: serde_json::from_str(&self.quality_json)?,
            fraud: serde_json::from_str(&self.fraud_json)?,
            extracted_fields: self
                .extracted_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            ocr_confidence: self.ocr_confidence,
            submitted_at: self.submitted_at,
        })
    }
}
