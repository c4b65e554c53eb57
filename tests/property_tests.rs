use bytes::Bytes;
use packrat::*;
use proptest::prelude::*;
use quickcheck_macros::quickcheck;

// Property: decomposing "http://host:port/path" recovers exactly the pieces
proptest! {
    #[test]
    fn prop_uri_round_trip(
        host in "[a-z]{1,10}\\.(com|org|net)",
        port in 1u16..=65535u16,
        path in "/[a-z0-9/]{1,50}"
    ) {
        let uri = format!("http://{host}:{port}{path}");
        let parts = parse_uri(&uri).unwrap();
        prop_assert_eq!(parts.host, host);
        prop_assert_eq!(parts.port, port.to_string());
        prop_assert_eq!(parts.rest, path);
    }
}

// Property: a bare authority always maps to the root path
proptest! {
    #[test]
    fn prop_uri_bare_authority_defaults_path(host in "[a-z]{1,20}") {
        let parts = parse_uri(&format!("http://{host}")).unwrap();
        prop_assert_eq!(parts.host, host);
        prop_assert_eq!(parts.rest, "/");
    }
}

// Property: tokens joined by whitespace come back out unchanged
proptest! {
    #[test]
    fn prop_tokenize_recovers_tokens(
        tokens in prop::collection::vec("[!-~]{1,20}", 1..=4)
    ) {
        let line = format!("{}\r\n", tokens.join(" "));
        let parsed = tokenize(line.as_bytes()).unwrap();
        prop_assert_eq!(parsed, tokens);
    }
}

// Property: any single token at the buffer limit fails the whole line
proptest! {
    #[test]
    fn prop_oversized_token_rejected(len in MAX_TOKEN_LEN - 1..MAX_TOKEN_LEN + 200) {
        let line = format!("GET {}\r\n", "a".repeat(len));
        prop_assert!(matches!(
            tokenize(line.as_bytes()),
            Err(ProxyError::TokenTooLong)
        ));
    }
}

// Property: rewriting emits exactly one Host/User-Agent/Connection/
// Proxy-Connection no matter what the client supplied, and the
// rewritten head parses as a clean origin-form HTTP/1.0 request
proptest! {
    #[test]
    fn prop_rewrite_single_instance_headers(
        host in "[a-z]{1,12}",
        path in "/[a-z0-9]{0,20}"
    ) {
        let raw = format!(
            "GET http://{host}{path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             User-Agent: curl/8.0\r\n\
             Connection: keep-alive\r\n\
             Proxy-Connection: keep-alive\r\n\
             X-Trace: 1\r\n\r\n"
        );
        let req = rewrite_request(raw.as_bytes()).unwrap();

        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed = httparse::Request::new(&mut headers);
        let status = parsed.parse(&req.head).unwrap();
        prop_assert!(status.is_complete());
        prop_assert_eq!(parsed.method, Some("GET"));
        prop_assert_eq!(parsed.path, Some(path.as_str()));
        prop_assert_eq!(parsed.version, Some(0));

        let count = |name: &str| {
            parsed
                .headers
                .iter()
                .filter(|h| h.name.eq_ignore_ascii_case(name))
                .count()
        };
        prop_assert_eq!(count("host"), 1);
        prop_assert_eq!(count("user-agent"), 1);
        prop_assert_eq!(count("connection"), 1);
        prop_assert_eq!(count("proxy-connection"), 1);
        prop_assert_eq!(count("x-trace"), 1);

        let value = |name: &str| {
            parsed
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| std::str::from_utf8(h.value).unwrap().to_owned())
        };
        prop_assert_eq!(value("user-agent"), Some(USER_AGENT.to_owned()));
        prop_assert_eq!(value("connection"), Some("close".to_owned()));
        prop_assert_eq!(value("proxy-connection"), Some("close".to_owned()));
    }
}

// Property: the cache byte budget survives any store sequence
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn prop_cache_byte_budget(
        sizes in prop::collection::vec(1usize..=MAX_OBJECT_SIZE, 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let cache = ProxyCache::new();
            for (i, size) in sizes.iter().enumerate() {
                let uri = format!("http://example.com/{i}");
                cache.store(&uri, Bytes::from(vec![0u8; *size])).await;
                prop_assert!(cache.total_bytes() <= MAX_CACHE_BYTES);
            }
            Ok(())
        })?;
    }
}

// Property: oversized payloads never enter the cache
proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn prop_oversized_payload_rejected(extra in 1usize..100_000) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let cache = ProxyCache::new();
            let stored = cache
                .store("http://example.com/big", Bytes::from(vec![0u8; MAX_OBJECT_SIZE + extra]))
                .await;
            prop_assert!(!stored);
            prop_assert_eq!(cache.total_bytes(), 0);
            Ok(())
        })?;
    }
}

#[quickcheck]
fn tokenize_never_panics(data: Vec<u8>) -> bool {
    let _ = tokenize(&data);
    true
}

#[quickcheck]
fn parse_uri_never_panics(uri: String) -> bool {
    let _ = parse_uri(&uri);
    true
}

#[quickcheck]
fn rewrite_never_panics(head: Vec<u8>) -> bool {
    let _ = rewrite_request(&head);
    true
}
