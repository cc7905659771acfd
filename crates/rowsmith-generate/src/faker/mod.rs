//! `fake`-backed providers for `{fake: <provider>}` formulas.

mod locales;

pub use locales::LocaleKey;

use fake::Fake;
use rand::{Rng, RngCore};
use rowsmith_recipe::FakeKind;

use crate::value::Value;

macro_rules! localized {
    ($locale:expr, $rng:expr, $module:ident :: $faker:ident ( $($arg:expr),* )) => {
        match $locale {
            LocaleKey::EnUs => {
                let value: String = fake::faker::$module::en::$faker($($arg),*).fake_with_rng($rng);
                value
            }
            LocaleKey::PtBr => {
                let value: String =
                    fake::faker::$module::pt_br::$faker($($arg),*).fake_with_rng($rng);
                value
            }
        }
    };
}

/// Draw one value for `kind` from `rng`.
pub fn fake_value(kind: FakeKind, locale: LocaleKey, rng: &mut dyn RngCore) -> Value {
    let text = match kind {
        FakeKind::FirstName => localized!(locale, rng, name::FirstName()),
        FakeKind::LastName => localized!(locale, rng, name::LastName()),
        FakeKind::Name => localized!(locale, rng, name::Name()),
        FakeKind::NameWithTitle => localized!(locale, rng, name::NameWithTitle()),
        FakeKind::Title => localized!(locale, rng, name::Title()),
        FakeKind::Email | FakeKind::SafeEmail => localized!(locale, rng, internet::SafeEmail()),
        FakeKind::FreeEmail => localized!(locale, rng, internet::FreeEmail()),
        FakeKind::Username => localized!(locale, rng, internet::Username()),
        FakeKind::Company => localized!(locale, rng, company::CompanyName()),
        FakeKind::CatchPhrase => localized!(locale, rng, company::CatchPhrase()),
        FakeKind::Buzzword => localized!(locale, rng, company::Buzzword()),
        FakeKind::Industry => localized!(locale, rng, company::Industry()),
        FakeKind::JobTitle => localized!(locale, rng, job::Title()),
        FakeKind::StreetName => localized!(locale, rng, address::StreetName()),
        FakeKind::BuildingNumber => localized!(locale, rng, address::BuildingNumber()),
        FakeKind::City => localized!(locale, rng, address::CityName()),
        FakeKind::State => localized!(locale, rng, address::StateName()),
        FakeKind::StateAbbr => localized!(locale, rng, address::StateAbbr()),
        FakeKind::Country => localized!(locale, rng, address::CountryName()),
        FakeKind::ZipCode => localized!(locale, rng, address::ZipCode()),
        FakeKind::Postcode => localized!(locale, rng, address::PostCode()),
        FakeKind::PhoneNumber => localized!(locale, rng, phone_number::PhoneNumber()),
        FakeKind::CellNumber => localized!(locale, rng, phone_number::CellNumber()),
        FakeKind::Word => localized!(locale, rng, lorem::Word()),
        FakeKind::Sentence => localized!(locale, rng, lorem::Sentence(4..10)),
        FakeKind::Paragraph => localized!(locale, rng, lorem::Paragraph(2..5)),
        FakeKind::Ipv4 => localized!(locale, rng, internet::IPv4()),
        FakeKind::Uuid => {
            let bytes: [u8; 16] = rng.random();
            uuid::Builder::from_random_bytes(bytes)
                .into_uuid()
                .to_string()
        }
        FakeKind::Boolean => return Value::Bool(rng.random_bool(0.5)),
    };
    Value::Text(text)
}
