//! Query token acquisition and binding (spec.md §4.3, C5).
//!
//! An `AbeToken` pairs a single-use Ed25519 subkey with a blind signature
//! the token server issued over that subkey's public bytes without ever
//! seeing which query it would later bind to.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use dsnet_crypto::{blindsign, ed25519};
use dsnet_proto::api::{self, BlindedChallenge, ServerPublicKeyResponse, SignerCommitment, SignerResponse};
use dsnet_store::SqliteRepository;

use crate::error::ClientError;

/// An unconsumed query token: an Ed25519 subkey plus the token server's
/// blind signature over its public bytes.
pub struct AbeToken {
    pub subkey: ed25519::SigningKeyPair,
    pub blind_signature: blindsign::BlindSignature,
}

pub struct TokenManager {
    http: reqwest::Client,
    token_server_url: String,
    repository: SqliteRepository,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, token_server_url: String, repository: SqliteRepository) -> Self {
        Self {
            http,
            token_server_url,
            repository,
        }
    }

    /// `GET {tokenBase}/publickey`, persisting the latest key (spec.md §4.4's
    /// `saveTokenServerKey`).
    pub async fn refresh_server_public_key(&self) -> Result<RistrettoPoint, ClientError> {
        let resp = self
            .http
            .get(format!("{}/publickey", self.token_server_url))
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClientError::InvalidAuthorizationResponse(format!(
                "publickey returned {}",
                resp.status()
            )));
        }
        let bytes = resp.bytes().await.map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        let parsed: ServerPublicKeyResponse = api::from_msgpack(&bytes)?;
        let point_bytes: [u8; 32] = parsed
            .public_key
            .try_into()
            .map_err(|_| ClientError::InvalidAuthorizationResponse("public key not 32 bytes".into()))?;
        let point = dsnet_crypto::oprf::decompress(&point_bytes)?;

        self.repository.save_token_server_key(&point_bytes).await?;
        Ok(point)
    }

    /// Run the full four-message blind-signature protocol for `count` fresh
    /// tokens and persist them (spec.md §4.3).
    pub async fn acquire_tokens(&self, signer_public: &RistrettoPoint, count: usize) -> Result<(), ClientError> {
        if count == 0 {
            return Ok(());
        }

        #[derive(serde::Serialize)]
        struct CommitmentsRequest {
            count: usize,
        }

        let commitments_resp = self
            .http
            .post(format!("{}/commitments", self.token_server_url))
            .body(api::to_msgpack(&CommitmentsRequest { count })?)
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;

        if !commitments_resp.status().is_success() {
            return Err(ClientError::InvalidAuthorizationResponse(format!(
                "commitments returned {}",
                commitments_resp.status()
            )));
        }
        let commitments_bytes = commitments_resp
            .bytes()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        let commitments: Vec<SignerCommitment> = api::from_msgpack(&commitments_bytes)?;

        let mut subkeys = Vec::with_capacity(count);
        let mut challenges = Vec::with_capacity(count);
        let mut blinding_states = Vec::with_capacity(count);

        for commitment in commitments.iter().take(count) {
            let subkey = ed25519::SigningKeyPair::generate();
            let commitment_point = decode_point(&commitment.commitment)?;
            let (state, challenge) = blindsign::blind(signer_public, &commitment_point, &subkey.public_bytes());
            subkeys.push(subkey);
            blinding_states.push(state);
            challenges.push(BlindedChallenge {
                challenge: challenge.to_bytes().to_vec(),
            });
        }

        let pretokens_resp = self
            .http
            .post(format!("{}/pretokens", self.token_server_url))
            .body(api::to_msgpack(&challenges)?)
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;

        if !pretokens_resp.status().is_success() {
            return Err(ClientError::InvalidAuthorizationResponse(format!(
                "pretokens returned {}",
                pretokens_resp.status()
            )));
        }
        let pretokens_bytes = pretokens_resp
            .bytes()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        let shares: Vec<SignerResponse> = api::from_msgpack(&pretokens_bytes)?;

        let mut tokens = Vec::with_capacity(count);
        for ((subkey, state), share) in subkeys.into_iter().zip(blinding_states.into_iter()).zip(shares.into_iter()) {
            let share_scalar = decode_scalar(&share.share)?;
            let sig = blindsign::unblind(&state, &share_scalar);
            tokens.push((subkey.secret_bytes().to_vec(), sig.to_bytes().to_vec()));
        }

        self.repository.save_tokens(&tokens).await?;
        Ok(())
    }

    /// Pop the newest unconsumed token, consuming it atomically
    /// (spec.md §4.4's `popToken`). Fails with `NoToken` if none remain.
    pub async fn pop_token(&self) -> Result<AbeToken, ClientError> {
        let row = self.repository.pop_token().await?.ok_or(ClientError::NoToken)?;
        let secret: [u8; 32] = row
            .token_secret_key
            .try_into()
            .map_err(|_| ClientError::InvalidAuthorizationResponse("stored token secret malformed".into()))?;
        let sig_bytes: [u8; 64] = row
            .blind_signature
            .try_into()
            .map_err(|_| ClientError::InvalidAuthorizationResponse("stored blind signature malformed".into()))?;
        Ok(AbeToken {
            subkey: ed25519::SigningKeyPair::from_bytes(&secret),
            blind_signature: blindsign::BlindSignature::from_bytes(&sig_bytes)?,
        })
    }

    /// Validate an inbound query's token binding against the locally stored
    /// `ServerPublicKey` (spec.md §4.3's inbound validation step).
    pub fn verify_token(signer_public: &RistrettoPoint, token_subkey_public: &[u8; 32], sig: &blindsign::BlindSignature) -> bool {
        blindsign::verify(signer_public, token_subkey_public, sig)
    }
}

fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint, ClientError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ClientError::InvalidAuthorizationResponse("commitment not 32 bytes".into()))?;
    Ok(dsnet_crypto::oprf::decompress(&arr)?)
}

fn decode_scalar(bytes: &[u8]) -> Result<Scalar, ClientError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ClientError::InvalidAuthorizationResponse("share not 32 bytes".into()))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
        .ok_or_else(|| ClientError::InvalidAuthorizationResponse("share is not a canonical scalar".into()))
}
