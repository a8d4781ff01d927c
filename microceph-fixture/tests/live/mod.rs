//! Tests against a real microceph, provisioned on the machine running the tests.
//!
//! These install snaps and run `sudo`, so they only make sense on a disposable CI runner with
//! `CI=true`.  They're marked `ignore` and must be run explicitly with `--ignored`.
use crate::Result;
use microceph_fixture::{fixture, Config};
use microceph_fixture_testing::logging::test_with_logging;

#[test]
#[ignore = "installs microceph with sudo; run on a CI runner only"]
fn bucket_is_usable_after_provisioning() -> Result<()> {
    test_with_logging(async move {
        let info = fixture::connection_information().await?;
        let config = Config::default();

        let client = info
            .aws_client(&config.s3_endpoint, &config.s3_region)
            .await;

        client
            .put_object()
            .bucket(info.bucket())
            .key("microceph-fixture/live-test")
            .body(aws_sdk_s3::primitives::ByteStream::from_static(b"hello ceph"))
            .send()
            .await?;

        let object = client
            .get_object()
            .bucket(info.bucket())
            .key("microceph-fixture/live-test")
            .send()
            .await?;
        let data = object.body.collect().await?.into_bytes();

        assert_eq!(&data[..], b"hello ceph");

        // Asking again in the same process must hand back the same keys
        let again = fixture::connection_information().await?;
        assert_eq!(again, info);

        Ok(())
    })
}
