//! A fixed, publicly known RSA key pair for tests and local demos.
//!
//! Anyone can decrypt traffic keyed with it; never deploy it.

use num_bigint::BigUint;

use crate::rsa::{Key, PrivateKey};

/// Fingerprint of [`private_key`].
pub const FINGERPRINT: i64 = -6423481794141486990;

const N: &str = "\
190623613470158261482917300351156760534101846986066260134461071675861768777040075127847677453068\
352892415711877673161629675102283484498961570863102634278926327931494652562529173650353155807171\
523390617713873098708566376797007176176374882203384091726248847984182760640565332862676273397514\
606802270364710161347557274343569506238033780763835627425691028974871714671608906064368808047167\
647628157920296599420633835221243375038231123085073636323538916422532512130528497782575868300554\
768336703868534625958180524312100855891259035601860680619748099580423410420323916283276211135256\
82634429077830524993304347566359194320969";

const D: &str = "\
915451164769981238503837168714181653519394308728803033147986715807900175412998886817570818975410\
349079061584720378755901487607262958233984924631866084803666292651768763816891518819047263270673\
503735997469762877794843196991105079479856394865222578230021685006969516001775028434844697007289\
924346744026077675677158171200766268418211292692913203323859170037594325938998989459652913375973\
512230853655818459816117160459660336424526826939487053857708576989860584123814319597014683419834\
941232314013199810194567184316777760546968541169189176481735524636897783416203119387064148323009\
9642613878687467661885767881100018081511";

/// The development key pair.
pub fn private_key() -> PrivateKey {
    PrivateKey::from_parts(parse(N), BigUint::from(65537u32), parse(D))
}

/// Public half of [`private_key`].
pub fn public_key() -> Key {
    private_key().public_key().clone()
}

fn parse(dec: &str) -> BigUint {
    BigUint::parse_bytes(dec.as_bytes(), 10).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_matches() {
        assert_eq!(public_key().fingerprint(), FINGERPRINT);
        assert_eq!(private_key().fingerprint(), FINGERPRINT);
    }
}
