//! Constants grounded in `original_source/pkg/types/types.go`.

pub const ONE_K: u64 = 1 << 10;
pub const ONE_MEG: u64 = 1 << 20;
pub const ONE_GIG: u64 = 1 << 30;

pub const HALF_GIG: u64 = 512 * ONE_MEG;
pub const TWO_GIGS: u64 = ONE_GIG * 2;

pub const MAX_DOMAINS_IN_MAP: usize = 32;
pub const DEFAULT_COORDINATOR_BASE_URL: &str = "https://api.domainsproject.org/api/vo";
pub const DEFAULT_ENVIRONMENT: &str = "test";
