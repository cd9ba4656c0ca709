/// Name for the live engine container backing a deployed record.
pub fn engine_container_name(container_id: i32, name: &str) -> String {
    format!("scalesim-{container_id}-{name}")
}

/// Name for the nth replica of a parent container.
pub fn replica_name(parent_name: &str, ordinal: i32) -> String {
    format!("{parent_name}-replica-{ordinal}")
}

pub fn localhost_url(port: i32) -> String {
    format!("http://localhost:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_container_name() {
        assert_eq!(engine_container_name(7, "webshop"), "scalesim-7-webshop");
    }

    #[test]
    fn test_replica_name() {
        assert_eq!(replica_name("webshop", 1), "webshop-replica-1");
        assert_eq!(replica_name("webshop", 3), "webshop-replica-3");
    }

    #[test]
    fn test_localhost_url() {
        assert_eq!(localhost_url(3000), "http://localhost:3000");
    }
}
