// Varseal - Signature Engine
//
// Signs and verifies canonical forms with a process-wide Ed25519 key.
// Tokens are stored base64-encoded in the `sig` column of signed rows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

use super::CanonicalForms;

/// Process-wide row signer.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign the current canonical form and return the storage token.
    pub fn sign(&self, forms: &CanonicalForms) -> String {
        let signature = self.key.sign(forms.current().as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    /// True when `token` is a valid signature over any of the forms.
    ///
    /// Malformed tokens are treated as mismatches, never as errors.
    pub fn verify(&self, forms: &CanonicalForms, token: &str) -> bool {
        let Ok(bytes) = BASE64.decode(token.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };

        let verifying_key = self.key.verifying_key();
        forms
            .iter()
            .any(|form| verifying_key.verify_strict(form.as_bytes(), &signature).is_ok())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(templates: &[&str], name: &str) -> CanonicalForms {
        CanonicalForms::render(
            templates,
            &[
                ("ProjectID", "42".to_string()),
                ("ID", "1".to_string()),
                ("Name", name.to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let f = forms(&["{ProjectID}{ID}{Name}"], "deploy");
        let token = signer.sign(&f);
        assert!(signer.verify(&f, &token));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let f = forms(&["{ProjectID}{ID}{Name}"], "deploy");
        assert_eq!(signer.sign(&f), signer.sign(&f));
    }

    #[test]
    fn test_changed_identity_fails_verification() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let token = signer.sign(&forms(&["{ProjectID}{ID}{Name}"], "deploy"));
        assert!(!signer.verify(&forms(&["{ProjectID}{ID}{Name}"], "deploy2"), &token));
    }

    #[test]
    fn test_each_identity_field_is_covered() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let render = |project_id: &str, id: &str, name: &str| {
            CanonicalForms::render(
                &["{ProjectID}{ID}{Name}"],
                &[
                    ("ProjectID", project_id.to_string()),
                    ("ID", id.to_string()),
                    ("Name", name.to_string()),
                ],
            )
            .unwrap()
        };
        let token = signer.sign(&render("42", "1", "deploy"));

        assert!(signer.verify(&render("42", "1", "deploy"), &token));
        assert!(!signer.verify(&render("43", "1", "deploy"), &token));
        assert!(!signer.verify(&render("42", "2", "deploy"), &token));
        assert!(!signer.verify(&render("42", "1", "deploy2"), &token));
    }

    #[test]
    fn test_other_key_fails_verification() {
        let f = forms(&["{ProjectID}{ID}{Name}"], "deploy");
        let token = Signer::from_bytes(&[7u8; 32]).sign(&f);
        assert!(!Signer::from_bytes(&[8u8; 32]).verify(&f, &token));
    }

    #[test]
    fn test_older_template_still_verifies() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let legacy = forms(&["{ID}{Name}"], "deploy");
        let token = signer.sign(&legacy);

        let current = forms(&["{ProjectID}{ID}{Name}", "{ID}{Name}"], "deploy");
        assert!(signer.verify(&current, &token));
    }

    #[test]
    fn test_malformed_token_is_a_mismatch() {
        let signer = Signer::from_bytes(&[7u8; 32]);
        let f = forms(&["{ID}"], "x");
        assert!(!signer.verify(&f, ""));
        assert!(!signer.verify(&f, "not base64 !!"));
        assert!(!signer.verify(&f, &BASE64.encode([1u8; 10])));
    }
}
