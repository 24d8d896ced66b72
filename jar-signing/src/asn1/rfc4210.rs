// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 types defined by RFC 4210.

use {
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode::{self, Values},
        Tag, Utf8String,
    },
    std::fmt::Display,
};

/// PKI free text.
///
/// ```ASN.1
/// PKIFreeText ::= SEQUENCE SIZE (1..MAX) OF UTF8String
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PkiFreeText(Vec<Utf8String>);

impl PkiFreeText {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    fn from_sequence<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let mut res = vec![];

        while let Some(s) = cons.take_opt_value_if(Tag::UTF8_STRING, Utf8String::from_content)? {
            res.push(s);
        }

        if res.is_empty() {
            return Err(cons.content_err("empty PKIFreeText"));
        }

        Ok(Self(res))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(encode::slice(&self.0, |x| x.clone().encode()))
    }
}

impl From<&str> for PkiFreeText {
    fn from(s: &str) -> Self {
        let mut res = vec![];

        if let Ok(s) = Utf8String::from_string(s.to_string()) {
            res.push(s);
        }

        Self(res)
    }
}

impl Display for PkiFreeText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self.0.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        f.write_str(&parts.join("; "))
    }
}
