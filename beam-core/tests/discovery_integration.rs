//! Live mDNS discovery between two in-process instances.

use std::time::{Duration, Instant};

use beam_core::discovery::{Advertiser, PeerBrowser};
use beam_core::identity::DeviceIdentity;

#[tokio::test]
#[ignore] // mDNS multicast is often unavailable in restricted CI environments
async fn two_instances_discover_each_other_and_not_themselves() {
    let alice = DeviceIdentity::ephemeral("Alice");
    let bob = DeviceIdentity::ephemeral("Bob");

    let advert_a = Advertiser::register(&alice, 4410).unwrap();
    let advert_b = Advertiser::register(&bob, 4411).unwrap();

    let browser_a = PeerBrowser::browse(&alice.device_id).unwrap();
    let browser_b = PeerBrowser::browse(&bob.device_id).unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let a_sees = browser_a.peers();
        let b_sees = browser_b.peers();
        let a_found_b = a_sees.iter().any(|p| p.id == bob.device_id);
        let b_found_a = b_sees.iter().any(|p| p.id == alice.device_id);
        let a_found_self = a_sees.iter().any(|p| p.id == alice.device_id);
        let b_found_self = b_sees.iter().any(|p| p.id == bob.device_id);

        assert!(!a_found_self, "a discovered itself");
        assert!(!b_found_self, "b discovered itself");
        if a_found_b && b_found_a {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "peers never discovered each other (a sees {a_sees:?}, b sees {b_sees:?})"
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    browser_a.shutdown();
    browser_b.shutdown();
    advert_a.shutdown();
    advert_b.shutdown();
}
