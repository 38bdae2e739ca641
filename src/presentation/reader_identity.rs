//! Best-effort identification of the reader from its authentication certificate.
//!
//! The identity is only shown to the holder. It is never used to decide what to disclose,
//! so any certificate that cannot be decoded, or that carries no authority key identifier,
//! simply yields no identity.
use x509_cert::{
    der::{oid::AssociatedOid, Decode},
    ext::pkix::{name::GeneralName, AuthorityKeyIdentifier, SubjectAltName},
    Certificate,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderIdentity {
    /// First subject alternative name of the leaf certificate, or its subject.
    pub name: String,
    /// Authority key identifier of the leaf certificate.
    pub key_identifier: Vec<u8>,
}

/// Identify the reader from a DER certificate chain, leaf first.
pub fn from_certificate_chain(chain: &[Vec<u8>]) -> Option<ReaderIdentity> {
    let leaf = chain.first()?;
    match from_leaf_certificate(leaf) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("unable to identify reader from its certificate: {e}");
            None
        }
    }
}

fn from_leaf_certificate(der: &[u8]) -> Result<Option<ReaderIdentity>, x509_cert::der::Error> {
    let certificate = Certificate::from_der(der)?;
    let tbs = &certificate.tbs_certificate;

    let mut key_identifier = None;
    let mut alternative_name = None;
    for extension in tbs.extensions.iter().flatten() {
        if extension.extn_id == AuthorityKeyIdentifier::OID {
            let aki = AuthorityKeyIdentifier::from_der(extension.extn_value.as_bytes())?;
            key_identifier = aki.key_identifier.map(|id| id.as_bytes().to_vec());
        } else if extension.extn_id == SubjectAltName::OID {
            let san = SubjectAltName::from_der(extension.extn_value.as_bytes())?;
            alternative_name = san.0.iter().find_map(general_name);
        }
    }
    let Some(key_identifier) = key_identifier else {
        tracing::debug!("reader certificate has no authority key identifier");
        return Ok(None);
    };

    Ok(Some(ReaderIdentity {
        name: alternative_name.unwrap_or_else(|| tbs.subject.to_string()),
        key_identifier,
    }))
}

fn general_name(name: &GeneralName) -> Option<String> {
    match name {
        GeneralName::DnsName(name)
        | GeneralName::Rfc822Name(name)
        | GeneralName::UniformResourceIdentifier(name) => Some(name.to_string()),
        GeneralName::DirectoryName(name) => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
    use rand::random;
    use rand::rngs::OsRng;
    use signature::Signer;
    use std::time::Duration;
    use x509_cert::{
        builder::{Builder, CertificateBuilder, Profile},
        der::{asn1::OctetString, Encode},
        name::Name,
        spki::{SignatureBitStringEncoding, SubjectPublicKeyInfoOwned},
        time::Validity,
    };

    fn certificate(
        subject: &str,
        aki: Option<Vec<u8>>,
        san: Option<GeneralName>,
    ) -> Vec<u8> {
        let key = SigningKey::random(&mut OsRng);
        let spki = SubjectPublicKeyInfoOwned::from_key(VerifyingKey::from(&key)).unwrap();
        let subject: Name = subject.parse().unwrap();
        let mut builder = CertificateBuilder::new(
            Profile::Root,
            random::<u64>().into(),
            Validity::from_now(Duration::from_secs(600)).unwrap(),
            subject,
            spki,
            &key,
        )
        .unwrap();
        if let Some(aki) = aki {
            builder
                .add_extension(&AuthorityKeyIdentifier {
                    key_identifier: Some(OctetString::new(aki).unwrap()),
                    ..Default::default()
                })
                .unwrap();
        }
        if let Some(san) = san {
            builder.add_extension(&SubjectAltName(vec![san])).unwrap();
        }
        let signature: Signature = key.sign(&builder.finalize().unwrap());
        let certificate = builder
            .assemble(signature.to_der().to_bitstring().unwrap())
            .unwrap();
        certificate.to_der().unwrap()
    }

    #[test]
    fn name_from_subject_alternative_name() {
        let der = certificate(
            "CN=Verifier,C=US",
            Some(vec![1, 2, 3, 4]),
            Some(GeneralName::DnsName(
                "verifier.example.com".to_string().try_into().unwrap(),
            )),
        );
        let identity = from_certificate_chain(&[der]).unwrap();
        assert_eq!(identity.name, "verifier.example.com");
        assert_eq!(identity.key_identifier, vec![1, 2, 3, 4]);
    }

    #[test]
    fn name_falls_back_to_subject() {
        let der = certificate("CN=Verifier,C=US", Some(vec![9; 20]), None);
        let identity = from_certificate_chain(&[der]).unwrap();
        assert_eq!(identity.name, "CN=Verifier,C=US");
        assert_eq!(identity.key_identifier, vec![9; 20]);
    }

    #[test]
    fn no_identity_without_key_identifier() {
        let der = certificate(
            "CN=Verifier,C=US",
            None,
            Some(GeneralName::DnsName(
                "verifier.example.com".to_string().try_into().unwrap(),
            )),
        );
        assert_eq!(from_certificate_chain(&[der]), None);
    }

    #[test]
    fn undecodable_certificate_yields_no_identity() {
        assert_eq!(from_certificate_chain(&[vec![0x30, 0x03, 0x01]]), None);
        assert_eq!(from_certificate_chain(&[]), None);
    }

    #[test]
    fn only_the_leaf_is_used() {
        let leaf = certificate("CN=Leaf,C=US", Some(vec![7; 20]), None);
        let identity = from_certificate_chain(&[leaf, vec![0xff]]).unwrap();
        assert_eq!(identity.name, "CN=Leaf,C=US");
    }
}
