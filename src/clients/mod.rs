pub mod ahs;
pub mod connection;
pub mod crypto;
pub mod mdl;
pub mod ms;
pub mod pacing;
pub mod rqp;
pub mod retry;
pub mod tdl;

use std::time::Duration;

use crate::clients::crypto::TokenCipher;
use crate::config::HttpConfig;
use crate::error::CuratorResult;
use crate::models::integration::Integration;
use crate::models::server::Server;

use ahs::ActivityHistoryClient;
use mdl::MdlClient;
use ms::MediaServerClient;
use pacing::PacingPool;
use rqp::RqpClient;
use tdl::TdlClient;

/// Builds per-request client instances from `Server`/`Integration` rows,
/// decrypting credentials on demand rather than holding plaintext anywhere
/// longer than one call needs it.
#[derive(Clone)]
pub struct ClientFactory {
    pacing: PacingPool,
    timeout: Duration,
}

impl ClientFactory {
    pub fn new(http: &HttpConfig) -> Self {
        Self {
            pacing: PacingPool::new(http.concurrency_per_host),
            timeout: Duration::from_secs(http.request_timeout_secs),
        }
    }

    pub fn ms_client(&self, server: &Server, cipher: &TokenCipher) -> CuratorResult<MediaServerClient> {
        let base_url = server
            .preferred_connection_url
            .clone()
            .unwrap_or_default();
        let token = cipher.decrypt(&server.auth_token_ciphertext)?;
        Ok(MediaServerClient::new(
            base_url,
            token,
            self.pacing.clone(),
            server.owner_id.clone(),
            self.timeout,
        ))
    }

    pub fn ahs_client(
        &self,
        integration: &Integration,
        cipher: &TokenCipher,
    ) -> CuratorResult<ActivityHistoryClient> {
        let api_key = cipher.decrypt(&integration.api_key_ciphertext)?;
        Ok(ActivityHistoryClient::new(
            integration.base_url.clone(),
            api_key,
            self.pacing.clone(),
            integration.owner_id.clone(),
            self.timeout,
        ))
    }

    pub fn tdl_client(&self, integration: &Integration, cipher: &TokenCipher) -> CuratorResult<TdlClient> {
        let api_key = cipher.decrypt(&integration.api_key_ciphertext)?;
        Ok(TdlClient::new(
            integration.base_url.clone(),
            api_key,
            self.pacing.clone(),
            integration.owner_id.clone(),
            self.timeout,
        ))
    }

    pub fn mdl_client(&self, integration: &Integration, cipher: &TokenCipher) -> CuratorResult<MdlClient> {
        let api_key = cipher.decrypt(&integration.api_key_ciphertext)?;
        Ok(MdlClient::new(
            integration.base_url.clone(),
            api_key,
            self.pacing.clone(),
            integration.owner_id.clone(),
            self.timeout,
        ))
    }

    pub fn rqp_client(&self, integration: &Integration, cipher: &TokenCipher) -> CuratorResult<RqpClient> {
        let api_key = cipher.decrypt(&integration.api_key_ciphertext)?;
        Ok(RqpClient::new(
            integration.base_url.clone(),
            api_key,
            self.pacing.clone(),
            integration.owner_id.clone(),
            self.timeout,
        ))
    }
}
