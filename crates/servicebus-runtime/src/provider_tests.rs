//! Tests for transport types and queue configuration.

use super::*;

const CONNECTION_STRING: &str = "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=c2VjcmV0a2V5PQ==";

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

#[test]
fn test_transport_capabilities() {
    assert!(TransportType::InMemory.supports_peek());
    assert!(!TransportType::AzureServiceBus.supports_peek());
    assert_eq!(TransportType::AzureServiceBus.max_batch_size(), 32);
    assert_eq!(TransportType::InMemory.max_message_size(), 10 * 1024 * 1024);
}

#[test]
fn test_transport_type_config_spelling() {
    let parsed: TransportType = serde_json::from_str("\"azure_service_bus\"").unwrap();
    assert_eq!(parsed, TransportType::AzureServiceBus);
    let parsed: TransportType = serde_json::from_str("\"in_memory\"").unwrap();
    assert_eq!(parsed, TransportType::InMemory);
}

#[test]
fn test_in_memory_config_defaults() {
    let config = InMemoryConfig::default();
    assert_eq!(config.max_queue_size, 10000);
    assert_eq!(config.lock_duration, Duration::seconds(30));
    assert!(config.auto_create_queues);
}

mod connection_string {
    use super::*;

    #[test]
    fn test_parse_portal_format() {
        let cs = ConnectionString::parse(CONNECTION_STRING).unwrap();
        assert_eq!(cs.host(), "contoso.servicebus.windows.net");
        assert_eq!(cs.shared_access_key_name(), "RootManageSharedAccessKey");
        // Base64 padding inside the value must survive the key=value split
        assert_eq!(cs.shared_access_key(), "c2VjcmV0a2V5PQ==");
        assert_eq!(cs.entity_path(), None);
    }

    #[test]
    fn test_parse_is_order_and_case_insensitive() {
        let cs = ConnectionString::parse(
            "sharedaccesskey=abc;ENTITYPATH=orders;SharedAccessKeyName=send;endpoint=sb://x.example.net",
        )
        .unwrap();
        assert_eq!(cs.host(), "x.example.net");
        assert_eq!(cs.entity_path(), Some("orders"));
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        let err = ConnectionString::parse("SharedAccessKeyName=a;SharedAccessKey=b").unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing { ref key } if key.contains("Endpoint")));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err =
            ConnectionString::parse("Endpoint=sb://x.example.net/;SharedAccessKeyName=a")
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Missing { ref key } if key.contains("SharedAccessKey")
        ));
    }

    #[test]
    fn test_segment_without_value_is_rejected_without_echoing_it() {
        let err = ConnectionString::parse("Endpoint=sb://x.example.net/;supersecret").unwrap_err();
        assert!(matches!(err, ConfigurationError::Parsing { .. }));
        assert!(!err.to_string().contains("supersecret"));
    }

    #[test]
    fn test_debug_output_redacts_key() {
        let cs = ConnectionString::parse(CONNECTION_STRING).unwrap();
        let debug = format!("{:?}", cs);
        assert!(!debug.contains("c2VjcmV0a2V5PQ=="));
        assert!(debug.contains("REDACTED"));
    }
}

mod queue_config {
    use super::*;

    #[test]
    fn test_requires_namespace_or_connection_string() {
        let err = QueueConfig::new(None, None, queue("orders"), TransportType::AzureServiceBus)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing { .. }));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = QueueConfig::new(
            Some("   ".to_string()),
            Some(String::new()),
            queue("orders"),
            TransportType::AzureServiceBus,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing { .. }));
    }

    #[test]
    fn test_namespace_only_uses_default_credential() {
        let config = QueueConfig::new(
            Some("contoso".to_string()),
            None,
            queue("orders"),
            TransportType::AzureServiceBus,
        )
        .unwrap();

        assert_eq!(
            config.fully_qualified_namespace(),
            "contoso.servicebus.windows.net"
        );
        assert_eq!(config.auth(), ServiceBusAuth::DefaultCredential);
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "https://contoso.servicebus.windows.net/"
        );
    }

    #[test]
    fn test_connection_string_wins_over_namespace() {
        let config = QueueConfig::new(
            Some("other".to_string()),
            Some(CONNECTION_STRING.to_string()),
            queue("orders"),
            TransportType::AzureServiceBus,
        )
        .unwrap();

        assert_eq!(
            config.fully_qualified_namespace(),
            "contoso.servicebus.windows.net"
        );
        match config.auth() {
            ServiceBusAuth::SharedAccessKey { key_name, .. } => {
                assert_eq!(key_name, "RootManageSharedAccessKey")
            }
            other => panic!("expected shared access key auth, got {:?}", other),
        }
    }

    #[test]
    fn test_entity_path_must_match_queue() {
        let cs = format!("{};EntityPath=invoices", CONNECTION_STRING);
        let err = QueueConfig::new(None, Some(cs), queue("orders"), TransportType::AzureServiceBus)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
    }

    #[test]
    fn test_defaults_and_builders() {
        let config = QueueConfig::in_memory(queue("orders"))
            .with_receive_timeout(Duration::milliseconds(250))
            .with_max_batch_size(5);

        assert_eq!(config.transport(), TransportType::InMemory);
        assert_eq!(config.receive_timeout(), Duration::milliseconds(250));
        assert_eq!(config.max_batch_size(), 5);
        assert_eq!(config.queue_name().as_str(), "orders");
    }

    #[test]
    fn test_qualify_namespace_variants() {
        assert_eq!(
            qualify_namespace("sb://contoso.servicebus.windows.net/").unwrap(),
            "contoso.servicebus.windows.net"
        );
        assert_eq!(
            qualify_namespace("contoso").unwrap(),
            "contoso.servicebus.windows.net"
        );
        assert!(qualify_namespace("bad name").is_err());
    }

    #[test]
    fn test_auth_debug_redacts_key() {
        let config = QueueConfig::new(
            None,
            Some(CONNECTION_STRING.to_string()),
            queue("orders"),
            TransportType::AzureServiceBus,
        )
        .unwrap();
        let debug = format!("{:?} {:?}", config.auth(), config);
        assert!(!debug.contains("c2VjcmV0a2V5PQ=="));
    }
}
