//! AWS gateway for bucketflow
//!
//! Implements [`bucketflow_cloud::CloudGateway`] for CloudFormation stacks,
//! S3 buckets and CloudFront distributions.
//!
//! # Requirements
//!
//! - AWS CLI v2 on `PATH` (or configured via `with_program`)
//! - Credentials resolvable by the CLI (profile, environment or SSO)
//!
//! # Example
//!
//! ```ignore
//! use bucketflow_cloud::CloudGateway;
//! use bucketflow_cloud_aws::{AwsCli, AwsGateway};
//!
//! let gateway = AwsGateway::new(AwsCli::new().with_region(Some("us-east-1".into())));
//!
//! let auth = gateway.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! let exists = gateway.bucket_exists("my-assets").await?;
//! ```

pub mod aws;
pub mod classify;
pub mod error;
pub mod gateway;

pub use aws::AwsCli;
pub use classify::classify_stderr;
pub use error::{AwsError, Result};
pub use gateway::{AwsGateway, CallerIdentity};
