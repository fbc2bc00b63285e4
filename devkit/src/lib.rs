/*!
# Wallboard DevKit - Stubs et utilitaires pour tester le harvester

Bibliothèque facilitant les tests du wallboard avec:
- Stub HTTP de l'API N-central (auth, devices paginés, service-monitor-status)
- Builders JSON pour devices et entrées de service
- Harness combinant répertoire temporaire et stub
*/

pub mod nable_stub;
pub mod fixtures;
pub mod test_utils;

pub use nable_stub::{NableStub, NableStubBuilder};
pub use fixtures::{DeviceBuilder, ServiceBuilder};
pub use test_utils::TestHarness;
