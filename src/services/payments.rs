use crate::config::PaymentConfig;
use crate::errors::ServiceError;
use tracing::instrument;

/// Digest algorithm used for payment link signatures
///
/// The provider lets merchants pick the digest per shop, so the name arrives
/// as configuration rather than being fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlg {
    Md5,
    Sha256,
}

impl SignatureAlg {
    /// Parses a configured digest name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "SHA256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Lowercase fixed-width hex digest of the payload
    fn digest_hex(&self, payload: &str) -> String {
        match self {
            Self::Md5 => {
                use md5::{Digest, Md5};
                let mut hasher = Md5::new();
                hasher.update(payload.as_bytes());
                hex::encode(hasher.finalize())
            }
            Self::Sha256 => {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(payload.as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Deterministic signature computation and verification for payment links
///
/// Outbound links are signed over `login:amount:invoice:password1`, inbound
/// result webhooks verify over `amount:invoice:password2`. The amount is
/// always the raw string form: for verification that means the exact value
/// the provider sent, with no numeric normalization.
#[derive(Clone)]
pub struct PaymentLinkService {
    merchant_login: String,
    password1: String,
    password2: String,
    alg: SignatureAlg,
    test_mode: bool,
    base_url: String,
    description: String,
}

impl PaymentLinkService {
    pub fn from_config(config: &PaymentConfig) -> Result<Self, ServiceError> {
        let alg = SignatureAlg::parse(&config.signature_alg).ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "Unsupported payment signature algorithm: {}",
                config.signature_alg
            ))
        })?;

        Ok(Self {
            merchant_login: config.merchant_login.clone(),
            password1: config.password1.clone(),
            password2: config.password2.clone(),
            alg,
            test_mode: config.test_mode,
            base_url: config.base_url.clone(),
            description: config.description.clone(),
        })
    }

    /// Signature for an outbound payment link
    pub fn sign_link(&self, out_sum: &str, invoice_id: i64) -> String {
        self.alg.digest_hex(&format!(
            "{}:{}:{}:{}",
            self.merchant_login, out_sum, invoice_id, self.password1
        ))
    }

    /// Expected signature for an inbound payment result
    pub fn sign_result(&self, out_sum: &str, invoice_id: i64) -> String {
        self.alg
            .digest_hex(&format!("{}:{}:{}", out_sum, invoice_id, self.password2))
    }

    /// Verifies an inbound result signature, case-insensitively
    pub fn verify_result(&self, out_sum: &str, invoice_id: i64, signature: &str) -> bool {
        let expected = self.sign_result(out_sum, invoice_id);
        constant_time_eq(
            expected.as_bytes(),
            signature.to_ascii_lowercase().as_bytes(),
        )
    }

    /// Builds the signed payment page URL for an order
    ///
    /// The invoice id doubles as the order id; the caller persists both the
    /// URL and the invoice id onto the order row before handing the link out.
    #[instrument(skip(self))]
    pub fn build_payment_url(&self, amount: i64, invoice_id: i64) -> Result<String, ServiceError> {
        let out_sum = amount.to_string();
        let signature = self.sign_link(&out_sum, invoice_id);

        let mut params = vec![
            ("MerchantLogin", self.merchant_login.clone()),
            ("OutSum", out_sum),
            ("InvId", invoice_id.to_string()),
            ("Description", self.description.clone()),
            ("SignatureValue", signature),
            ("Culture", "ru".to_string()),
            ("Encoding", "utf-8".to_string()),
        ];
        if self.test_mode {
            params.push(("IsTest", "1".to_string()));
        }

        let url = reqwest::Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| ServiceError::InternalError(format!("Invalid payment base URL: {}", e)))?;

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(alg: &str) -> PaymentLinkService {
        let config = PaymentConfig {
            merchant_login: "demo".into(),
            password1: "first-secret".into(),
            password2: "second-secret".into(),
            signature_alg: alg.into(),
            test_mode: true,
            base_url: "https://pay.example.com/Merchant/Index.aspx".into(),
            description: "Drop preorder".into(),
        };
        PaymentLinkService::from_config(&config).unwrap()
    }

    #[test]
    fn digest_hex_matches_known_vectors() {
        assert_eq!(
            SignatureAlg::Md5.digest_hex(""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            SignatureAlg::Sha256.digest_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn from_config_rejects_unknown_digest() {
        let config = PaymentConfig {
            signature_alg: "crc32".into(),
            ..PaymentConfig::default()
        };
        assert_matches!(
            PaymentLinkService::from_config(&config),
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[test]
    fn result_signature_verifies_case_insensitively() {
        let svc = service("MD5");
        let signature = svc.sign_result("8990", 42);
        assert!(svc.verify_result("8990", 42, &signature));
        assert!(svc.verify_result("8990", 42, &signature.to_ascii_uppercase()));
    }

    #[test]
    fn tampering_with_any_parameter_breaks_verification() {
        let svc = service("MD5");
        let signature = svc.sign_result("8990", 42);
        assert!(!svc.verify_result("8991", 42, &signature));
        assert!(!svc.verify_result("8990", 43, &signature));
        assert!(!svc.verify_result("8990", 42, "deadbeef"));
    }

    #[test]
    fn link_and_result_signatures_use_different_secrets() {
        let svc = service("MD5");
        assert_ne!(svc.sign_link("8990", 42), svc.sign_result("8990", 42));
    }

    #[test]
    fn sha256_configuration_changes_signatures() {
        let md5 = service("MD5");
        let sha = service("SHA256");
        assert_ne!(md5.sign_result("8990", 42), sha.sign_result("8990", 42));
        assert_eq!(sha.sign_result("8990", 42).len(), 64);
    }

    #[test]
    fn payment_url_carries_signed_parameters() {
        let svc = service("MD5");
        let url = svc.build_payment_url(8990, 42).unwrap();

        assert!(url.starts_with("https://pay.example.com/Merchant/Index.aspx?"));
        assert!(url.contains("MerchantLogin=demo"));
        assert!(url.contains("OutSum=8990"));
        assert!(url.contains("InvId=42"));
        assert!(url.contains(&format!("SignatureValue={}", svc.sign_link("8990", 42))));
        assert!(url.contains("IsTest=1"));
    }

    #[test]
    fn production_mode_omits_test_flag() {
        let config = PaymentConfig {
            merchant_login: "demo".into(),
            password1: "first-secret".into(),
            password2: "second-secret".into(),
            test_mode: false,
            ..PaymentConfig::default()
        };
        let svc = PaymentLinkService::from_config(&config).unwrap();
        let url = svc.build_payment_url(8990, 42).unwrap();
        assert!(!url.contains("IsTest"));
    }
}
