//! Evidence files attached to `yes` answers, and the intake policy uploads
//! must satisfy before anything is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use assurance_core::{AnswerId, DomainError, DomainResult, Entity, EvidenceFileId, UserId};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// A stored evidence file. The payload is never serialized into responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub id: EvidenceFileId,
    pub answer_id: AnswerId,
    pub file_path: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub checksum_sha256: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for EvidenceFile {
    type Id = EvidenceFileId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// An upload as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceUpload {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Server-side limits for evidence uploads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePolicy {
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl EvidencePolicy {
    /// Batch-level checks (count). Per-file checks run in [`Self::check_file`].
    pub fn check_batch(&self, uploads: &[EvidenceUpload]) -> DomainResult<()> {
        if uploads.len() > self.max_files {
            return Err(DomainError::bad_request(format!(
                "at most {} evidence files may be uploaded at once",
                self.max_files
            )));
        }
        Ok(())
    }

    /// PDF only, non-empty, within the size limit.
    pub fn check_file(&self, upload: &EvidenceUpload) -> DomainResult<()> {
        let name = upload.original_name.trim();
        if name.is_empty() {
            return Err(DomainError::bad_request("evidence file name is required"));
        }
        if upload.bytes.is_empty() {
            return Err(DomainError::bad_request(format!("evidence file '{name}' is empty")));
        }
        if upload.bytes.len() as u64 > self.max_file_bytes {
            return Err(DomainError::bad_request(format!(
                "evidence file '{name}' exceeds the {} byte limit",
                self.max_file_bytes
            )));
        }
        let declared_pdf = upload.content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE);
        if !declared_pdf || !upload.bytes.starts_with(PDF_MAGIC) {
            return Err(DomainError::bad_request(format!(
                "evidence file '{name}' must be a PDF"
            )));
        }
        Ok(())
    }
}

/// Turn a validated upload into a row ready to insert.
///
/// The id is handed in so callers preparing a batch in parallel can allocate
/// ids in upload order; listings sort by `(created_at, id)`.
pub fn prepare_evidence(
    id: EvidenceFileId,
    upload: EvidenceUpload,
    answer_id: AnswerId,
    created_by: UserId,
    now: DateTime<Utc>,
) -> EvidenceFile {
    let checksum = hex::encode(Sha256::digest(&upload.bytes));
    EvidenceFile {
        id,
        answer_id,
        file_path: format!("evidence/{answer_id}/{id}.pdf"),
        original_name: upload.original_name.trim().to_string(),
        content_type: PDF_CONTENT_TYPE.to_string(),
        size_bytes: upload.bytes.len() as u64,
        checksum_sha256: checksum,
        bytes: upload.bytes,
        created_by,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, len: usize) -> EvidenceUpload {
        let mut bytes = PDF_MAGIC.to_vec();
        bytes.resize(len.max(PDF_MAGIC.len()), b' ');
        EvidenceUpload {
            original_name: name.to_string(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            bytes,
        }
    }

    #[test]
    fn accepts_pdf_within_limits() {
        let policy = EvidencePolicy::default();
        assert!(policy.check_file(&pdf("policy.pdf", 64)).is_ok());
    }

    #[test]
    fn rejects_non_pdf_oversized_and_too_many() {
        let policy = EvidencePolicy { max_file_bytes: 32, max_files: 1 };

        let mut png = pdf("shot.png", 10);
        png.content_type = "image/png".to_string();
        assert!(matches!(policy.check_file(&png), Err(DomainError::BadRequest(_))));

        let mut spoofed = pdf("fake.pdf", 10);
        spoofed.bytes = b"PK\x03\x04".to_vec();
        assert!(policy.check_file(&spoofed).is_err());

        assert!(policy.check_file(&pdf("big.pdf", 64)).is_err());
        assert!(policy.check_batch(&[pdf("a.pdf", 8), pdf("b.pdf", 8)]).is_err());
    }

    #[test]
    fn prepared_row_carries_checksum_and_path() {
        let answer_id = AnswerId::new();
        let file = prepare_evidence(EvidenceFileId::new(), pdf(" report.pdf ", 16), answer_id, UserId::new(), Utc::now());
        assert_eq!(file.original_name, "report.pdf");
        assert_eq!(file.size_bytes, 16);
        assert_eq!(file.checksum_sha256.len(), 64);
        assert!(file.file_path.starts_with(&format!("evidence/{answer_id}/")));
    }
}
