//! 服务密钥下发
//!
//! 目标 `.env` 已存在时视为正确，永不覆盖；两边都没有时仅告警

use std::io::ErrorKind;
use tokio::io::AsyncWriteExt;

use crate::domain::{SecretBundle, SecretProvision};

use super::error::DeployError;

/// 按 copy-if-missing 策略下发密钥
pub async fn provision(bundle: &SecretBundle) -> Result<SecretProvision, DeployError> {
    let service = bundle.service_name.as_str();

    if tokio::fs::try_exists(&bundle.destination_path)
        .await
        .map_err(|e| DeployError::io(format!("failed to stat secrets for {}", service), e))?
    {
        tracing::info!(service = %service, ".env already present");
        return Ok(SecretProvision::AlreadyPresent);
    }

    let content = match tokio::fs::read(&bundle.source_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(service = %service, "No .env found in compose or secrets");
            return Ok(SecretProvision::Missing);
        }
        Err(e) => {
            return Err(DeployError::io(
                format!("failed to read secrets for {}", service),
                e,
            ))
        }
    };

    // create_new 保证并发出现的目标文件也不会被覆盖
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&bundle.destination_path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(SecretProvision::AlreadyPresent)
        }
        Err(e) => {
            return Err(DeployError::io(
                format!("failed to write secrets for {}", service),
                e,
            ))
        }
    };
    file.write_all(&content)
        .await
        .map_err(|e| DeployError::io(format!("failed to write secrets for {}", service), e))?;
    file.flush()
        .await
        .map_err(|e| DeployError::io(format!("failed to write secrets for {}", service), e))?;

    tracing::info!(service = %service, "Copied .env from secrets");
    Ok(SecretProvision::Copied)
}
