#[cfg(test)]
mod tests {
    use crate::config::SecurityConfig;
    use crate::security::EncryptionService;
    use crate::TenantId;

    fn test_security_config() -> SecurityConfig {
        SecurityConfig {
            aes_encryption_key: "12345678901234567890123456789012".to_string(),
        }
    }

    #[test]
    fn test_schema_name_generation() {
        use crate::utils::generate_schema_name;

        let schema1 = generate_schema_name();
        let schema2 = generate_schema_name();

        assert!(schema1.starts_with("tenant_"));
        assert!(schema2.starts_with("tenant_"));
        assert_ne!(schema1, schema2);
        assert_eq!(schema1.len(), 15);
    }

    #[test]
    fn test_encryption_service() {
        let config = test_security_config();
        let service = EncryptionService::new(&config).unwrap();
        let plaintext = "This is a secret message";

        let encrypted = service.encrypt_string(plaintext).unwrap();
        assert!(!encrypted.is_empty());
        assert_ne!(encrypted, plaintext);

        let decrypted = service.decrypt_string(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encryption_rejects_wrong_key_length() {
        let config = SecurityConfig {
            aes_encryption_key: "too-short".to_string(),
        };
        assert!(EncryptionService::new(&config).is_err());
    }

    #[test]
    fn test_tenant_id_serialization() {
        use uuid::Uuid;

        let tenant_id = TenantId(Uuid::new_v4());
        let serialized = serde_json::to_string(&tenant_id).unwrap();
        let deserialized: TenantId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(tenant_id.0, deserialized.0);
    }

    #[test]
    fn test_tenant_id_display() {
        let tenant_id = TenantId::new();
        assert_eq!(tenant_id.to_string(), tenant_id.0.to_string());
    }
}
